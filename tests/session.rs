mod common;

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::future::try_join_all;
use itertools::Itertools;
use tokio_util::sync::CancellationToken;

use cloud_asdf::{
    array::DataType,
    array_subset::SliceRequest,
    byte_range::ByteRange,
    error::{IOFailure, OutOfRangeCause},
    format::FormatError,
    session::{AttributeValue, SessionOptions, SessionState},
    storage::{AsyncReadableStorageTraits, ObjectKey, StorageError},
    ReadError, Session,
};

use common::{int32_grid, layouts_file, options, Dataset, Dtype, Filter, Group, TestObject};

fn slice(slices: &[(u64, u64, u64)]) -> SliceRequest {
    SliceRequest::new(slices.to_vec()).unwrap()
}

#[tokio::test]
async fn session_read_chunked_slice() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    assert_eq!(session.state(), SessionState::Open);

    let array = session
        .read_dataset("/chunked", Some(&slice(&[(20, 30, 1), (0, 10, 1)])))
        .await
        .unwrap();
    assert_eq!(array.shape(), &[10, 10]);
    assert_eq!(array.data_type(), &DataType::Int32);
    assert_eq!(array.as_slice::<i32>().unwrap(), &int32_grid(100, 10)[200..300]);

    // a slice within a chunk that is already cached is served without storage reads
    object.storage.reset();
    let array = session
        .read_dataset("/chunked", Some(&slice(&[(25, 27, 1), (3, 5, 1)])))
        .await
        .unwrap();
    assert_eq!(array.as_slice::<i32>().unwrap(), &[253, 254, 263, 264]);
    assert_eq!(object.storage.reads(), 0);

    // a slice of another chunk reads only that chunk
    let array = session
        .read_dataset("/chunked", Some(&slice(&[(40, 50, 1), (0, 10, 1)])))
        .await
        .unwrap();
    assert_eq!(array.as_slice::<i32>().unwrap(), &int32_grid(100, 10)[400..500]);
    assert_eq!(object.storage.reads(), 1);
    assert_eq!(object.storage.bytes_read(), 10 * 10 * 4);
}

#[tokio::test]
async fn session_read_strided_slice() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let grid = int32_grid(100, 10);
    let expected = (0..100)
        .step_by(10)
        .cartesian_product((0..10).step_by(3))
        .map(|(row, column)| grid[row * 10 + column])
        .collect_vec();
    for path in ["/chunked", "/filtered"] {
        let array = session
            .read_dataset(path, Some(&slice(&[(0, 100, 10), (0, 10, 3)])))
            .await
            .unwrap();
        assert_eq!(array.shape(), &[10, 4]);
        assert_eq!(array.as_slice::<i32>().unwrap(), expected.as_slice(), "{path}");
    }
}

#[tokio::test]
async fn session_read_filtered() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let chunked = session.read_dataset("/chunked", None).await.unwrap();
    let filtered = session.read_dataset("/filtered", None).await.unwrap();
    assert_eq!(chunked, filtered);
    assert_eq!(filtered.into_vec::<i32>().unwrap(), int32_grid(100, 10));

    let info = session.dataset_info("/filtered").await.unwrap();
    assert_eq!(info.layout, "chunked");
    assert_eq!(info.chunk_shape, Some(vec![10, 10]));
    assert_eq!(
        info.filters.iter().map(|filter| filter.name.as_str()).collect_vec(),
        vec!["shuffle", "deflate", "fletcher32"]
    );

    // the second chunk was written without the shuffle filter
    let masked = session.read_dataset("/masked", None).await.unwrap();
    assert_eq!(masked.as_slice::<u16>().unwrap(), (0u16..64).collect_vec());
}

#[tokio::test]
async fn session_read_edge_chunks() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let grid = int32_grid(25, 7);
    let array = session.read_dataset("/edge", None).await.unwrap();
    assert_eq!(array.shape(), &[25, 7]);
    assert_eq!(array.as_slice::<i32>().unwrap(), grid.as_slice());

    let array = session
        .read_dataset("/edge", Some(&slice(&[(20, 25, 1), (4, 7, 1)])))
        .await
        .unwrap();
    let expected = (20..25)
        .cartesian_product(4..7)
        .map(|(row, column)| grid[row * 7 + column])
        .collect_vec();
    assert_eq!(array.as_slice::<i32>().unwrap(), expected.as_slice());
}

#[tokio::test]
async fn session_read_fill_value() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let sparse = session
        .read_dataset("/sparse", None)
        .await
        .unwrap()
        .into_vec::<i32>()
        .unwrap();
    assert_eq!(&sparse[..100], &int32_grid(10, 10)[..]);
    assert!(sparse[100..].iter().all(|value| *value == -1));

    let unallocated = session.read_dataset("/unallocated", None).await.unwrap();
    assert_eq!(unallocated.as_slice::<i16>().unwrap(), &[7, 7, 7, 7]);
}

#[tokio::test]
async fn session_read_layouts() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;

    let contiguous = session
        .read_dataset("/contiguous", Some(&slice(&[(10, 20, 2)])))
        .await
        .unwrap();
    assert_eq!(
        contiguous.as_slice::<f64>().unwrap(),
        &[10.0, 12.0, 14.0, 16.0, 18.0]
    );

    let compact = session.read_dataset("/compact", None).await.unwrap();
    assert_eq!(compact.shape(), &[2, 3]);
    assert_eq!(compact.bytes().unwrap(), &[1, 2, 3, 4, 5, 6]);

    let big_endian = session.read_dataset("/big_endian", None).await.unwrap();
    assert_eq!(big_endian.as_slice::<i32>().unwrap(), &[1, -2, 300_000]);

    let scalar = session.read_dataset("/scalar", None).await.unwrap();
    assert!(scalar.shape().is_empty());
    assert_eq!(scalar.as_slice::<f32>().unwrap(), &[2.5]);

    let empty = session.read_dataset("/empty", None).await.unwrap();
    assert_eq!(empty.shape(), &[0, 4]);
    assert_eq!(empty.num_elements(), 0);

    let names = session.read_dataset("/names", None).await.unwrap();
    assert_eq!(names.data_type(), &DataType::VarString);
    assert_eq!(names.strings().unwrap(), &["alpha", "", "gamma"]);
    let codes = session.read_dataset("/codes", None).await.unwrap();
    assert_eq!(codes.strings().unwrap(), &["ab", "wxyz"]);

    let leaf = session
        .read_dataset("nested/inner/leaf", None)
        .await
        .unwrap();
    assert_eq!(leaf.as_slice::<i8>().unwrap(), &[-1, 0, 1]);
}

#[tokio::test]
async fn session_list() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let root = session.list("/").await.unwrap();
    assert_eq!(root.len(), 17);
    assert_eq!(&root[..3], &["big_endian", "chunked", "codes"]);
    assert!(root.iter().tuple_windows().all(|(a, b)| a < b));

    let wide = session.list("/wide").await.unwrap();
    assert_eq!(
        wide,
        (0..20).map(|i| format!("member_{i:02}")).collect_vec()
    );
    assert_eq!(session.list("/nested/inner").await.unwrap(), vec!["leaf"]);
    assert!(session.is_dataset("/nested/inner/leaf").await.unwrap());
    assert!(!session.is_dataset("/nested/inner").await.unwrap());
    assert!(!session.is_dataset("/nested/missing").await.unwrap());

    // a group with links in its object header
    assert_eq!(session.list("/links").await.unwrap(), vec!["x"]);
    let x = session.read_dataset("/links/x", None).await.unwrap();
    assert_eq!(x.as_slice::<u32>().unwrap(), &[10, 20]);
}

#[tokio::test]
async fn session_attributes() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    assert_eq!(
        session.attribute_names("/").await.unwrap(),
        vec!["title", "version"]
    );
    assert_eq!(
        session.read_attribute("/", "title").await.unwrap(),
        AttributeValue::String("layouts".to_string())
    );
    let AttributeValue::Array(version) = session.read_attribute("/", "version").await.unwrap()
    else {
        panic!("expected a numeric attribute")
    };
    assert_eq!(version.as_slice::<i32>().unwrap(), &[1, 2]);

    let AttributeValue::Array(depth) = session
        .read_attribute("/nested/inner", "depth")
        .await
        .unwrap()
    else {
        panic!("expected a numeric attribute")
    };
    assert_eq!(depth.as_slice::<i64>().unwrap(), &[2]);
    assert_eq!(
        session
            .read_attribute("/links", "kind")
            .await
            .unwrap()
            .as_str(),
        Some("compact")
    );

    assert!(matches!(
        session.read_attribute("/", "missing").await,
        Err(ReadError::PathNotFound(_))
    ));
}

#[tokio::test]
async fn session_path_errors() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    assert!(matches!(
        session.read_dataset("/missing", None).await,
        Err(ReadError::PathNotFound(path)) if path == "/missing"
    ));
    assert!(matches!(
        session.read_dataset("/chunked/child", None).await,
        Err(ReadError::PathNotFound(_))
    ));
    assert!(matches!(
        session.read_dataset("/nested", None).await,
        Err(ReadError::UnexpectedNodeKind {
            expected: "dataset",
            ..
        })
    ));
    assert!(matches!(
        session.list("/chunked").await,
        Err(ReadError::UnexpectedNodeKind {
            expected: "group",
            ..
        })
    ));
    assert!(matches!(
        session.read_dataset("/a/../b", None).await,
        Err(ReadError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn session_slice_errors() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    assert!(matches!(
        session
            .read_dataset("/chunked", Some(&slice(&[(90, 110, 1), (0, 10, 1)])))
            .await,
        Err(ReadError::OutOfRange(OutOfRangeCause::Slice {
            dimension: 0,
            extent: 100,
            ..
        }))
    ));
    assert!(matches!(
        session
            .read_dataset("/chunked", Some(&slice(&[(0, 10, 1)])))
            .await,
        Err(ReadError::OutOfRange(OutOfRangeCause::SliceRank {
            rank: 2,
            slice_rank: 1
        }))
    ));
}

#[tokio::test]
async fn session_unsupported_filter() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let err = session.read_dataset("/lzf", None).await.unwrap_err();
    assert!(matches!(
        err,
        ReadError::UnsupportedFilter { ref path, id: 32000, ref name } if path == "/lzf" && name == "lzf"
    ));
    assert!(!err.is_retryable());

    // the dataset can still be described
    let info = session.dataset_info("/lzf").await.unwrap();
    assert_eq!(info.filters[0].id, 32000);
}

#[tokio::test]
async fn session_invalid_signature() {
    let object = TestObject::new(vec![0; 4096]);
    let session = Session::new(object.storage.clone(), object.key.clone(), options());
    let err = session.connect().await.unwrap_err();
    assert!(matches!(
        err,
        ReadError::FormatError {
            source: FormatError::SignatureNotFound,
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.read_dataset("/a", None).await,
        Err(ReadError::SessionClosed)
    ));
}

#[tokio::test]
async fn session_object_not_found() {
    let object = TestObject::new(layouts_file());
    let missing = ObjectKey::new("data/missing.h5").unwrap();
    let err = Session::open(object.storage.clone(), missing, options())
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::IOFailure(IOFailure::NotFound(_))));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn session_userblock() {
    let root = Group::new().child("x", Dataset::new(Dtype::U8, &[4], &[1u8, 2, 3, 4]));
    let object = TestObject::new(common::write_hdf5_with_userblock(&root, 512));
    let session = object.open().await;
    let x = session.read_dataset("/x", None).await.unwrap();
    assert_eq!(x.bytes().unwrap(), &[1, 2, 3, 4]);
}

#[tokio::test]
async fn session_repeated_read_is_cached() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let first = session.read_dataset("/filtered", None).await.unwrap();
    object.storage.reset();
    let second = session.read_dataset("/filtered", None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(object.storage.reads(), 0);
    assert!(session.cache_stats().hits > 0);
}

#[tokio::test]
async fn session_concurrent_reads_are_deduplicated() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    object.storage.reset();
    session.read_dataset("/filtered", None).await.unwrap();
    let single = object.storage.reads();

    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    object.storage.reset();
    let arrays = try_join_all((0..8).map(|_| session.read_dataset("/filtered", None)))
        .await
        .unwrap();
    assert!(arrays.iter().all_equal());
    assert!(object.storage.reads() <= single);
}

#[tokio::test]
async fn session_close() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    session.read_dataset("/chunked", None).await.unwrap();
    assert!(session.cache_stats().entries > 0);
    assert!(matches!(
        session.connect().await,
        Err(ReadError::InvalidSessionState(SessionState::Open))
    ));

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.cache_stats().entries, 0);
    assert!(matches!(
        session.read_dataset("/chunked", None).await,
        Err(ReadError::SessionClosed)
    ));
    assert!(matches!(
        session.list("/").await,
        Err(ReadError::SessionClosed)
    ));
    session.close();

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Open);
    assert!(session.read_dataset("/chunked", None).await.is_ok());
}

#[tokio::test]
async fn session_cancelled_read() {
    let object = TestObject::new(layouts_file());
    let session = object.open().await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    object.storage.reset();
    assert!(matches!(
        session
            .read_dataset_cancellable("/filtered", None, &cancel)
            .await,
        Err(ReadError::Cancelled)
    ));
    assert_eq!(object.storage.reads(), 0);

    let array = session
        .read_dataset_cancellable("/filtered", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(array.num_elements(), 1000);
}

/// Corrupt the first occurrence of `pattern` in `data` with `replacement`.
fn replace(data: &mut [u8], pattern: &[u8], replacement: &[u8]) {
    let position = data
        .windows(pattern.len())
        .position(|window| window == pattern)
        .unwrap();
    data[position..position + replacement.len()].copy_from_slice(replacement);
}

#[tokio::test]
async fn session_checksum_mismatch() {
    let values = (1000..1100).collect_vec();
    let root = Group::new().child(
        "checked",
        Dataset::new(Dtype::I32, &[100], &values)
            .chunked(&[100])
            .filters(&[Filter::Fletcher32]),
    );
    let mut data = common::write_hdf5(&root);
    replace(&mut data, &1050i32.to_le_bytes(), &1051i32.to_le_bytes());

    let object = TestObject::new(data);
    let session = object.open().await;
    assert!(matches!(
        session.read_dataset("/checked", None).await,
        Err(ReadError::FormatError {
            source: FormatError::Filter(_),
            ..
        })
    ));

    let session = object
        .open_with(
            SessionOptions::builder()
                .validate_checksums(false)
                .build(),
        )
        .await;
    let array = session.read_dataset("/checked", None).await.unwrap();
    assert_eq!(array.as_slice::<i32>().unwrap()[50], 1051);
}

#[tokio::test]
async fn session_corrupt_pointers() {
    let values = (5000..5016).collect_vec();
    let root = Group::new().child("x", Dataset::new(Dtype::I32, &[16], &values));
    let data = common::write_hdf5(&root);
    let address = data
        .windows(4)
        .position(|window| window == 5000i32.to_le_bytes())
        .unwrap() as u64;
    let mut layout = vec![3, 1];
    layout.extend_from_slice(&address.to_le_bytes());
    layout.extend_from_slice(&64u64.to_le_bytes());

    // an address beyond the end of the object
    let mut beyond = data.clone();
    let mut corrupt = vec![3, 1];
    corrupt.extend_from_slice(&(1u64 << 40).to_le_bytes());
    replace(&mut beyond, &layout, &corrupt);
    let session = TestObject::new(beyond).open().await;
    assert!(matches!(
        session.read_dataset("/x", None).await,
        Err(ReadError::OutOfRange(OutOfRangeCause::CorruptPointer { .. }))
    ));

    // a length extending beyond the end of the object
    let mut past_end = data.clone();
    let mut corrupt = vec![3, 1];
    corrupt.extend_from_slice(&(data.len() as u64 - 8).to_le_bytes());
    replace(&mut past_end, &layout, &corrupt);
    let session = TestObject::new(past_end).open().await;
    assert!(matches!(
        session.read_dataset("/x", None).await,
        Err(ReadError::FormatError {
            source: FormatError::LengthPastEnd { length: 64, .. },
            ..
        })
    ));
}

#[tokio::test]
async fn session_dataspace_overflow() {
    let values = (0..16).collect_vec();
    let root = Group::new().child("x", Dataset::new(Dtype::I32, &[16, 1], &values));
    let mut data = common::write_hdf5(&root);
    let mut dataspace = vec![1, 2, 0, 0, 0, 0, 0, 0];
    dataspace.extend_from_slice(&16u64.to_le_bytes());
    dataspace.extend_from_slice(&1u64.to_le_bytes());
    let mut corrupt = vec![1, 2, 0, 0, 0, 0, 0, 0];
    corrupt.extend_from_slice(&(u64::MAX / 2).to_le_bytes());
    corrupt.extend_from_slice(&4u64.to_le_bytes());
    replace(&mut data, &dataspace, &corrupt);

    let session = TestObject::new(data).open().await;
    assert!(matches!(
        session.read_dataset("/x", None).await,
        Err(ReadError::FormatError {
            source: FormatError::Invalid(_),
            ..
        })
    ));
    assert!(matches!(
        session
            .read_dataset("/x", Some(&slice(&[(0, 2, 1), (0, 4, 1)])))
            .await,
        Err(ReadError::FormatError { .. })
    ));
}

/// A store that never answers reads in time.
struct StalledStore {
    data: Bytes,
}

#[async_trait::async_trait]
impl AsyncReadableStorageTraits for StalledStore {
    async fn size(&self, _key: &ObjectKey) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }

    async fn read(&self, _key: &ObjectKey, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(self
            .data
            .slice(byte_range.offset() as usize..byte_range.end() as usize))
    }
}

#[tokio::test]
async fn session_fetch_timeout() {
    let storage = Arc::new(StalledStore {
        data: layouts_file().into(),
    });
    let options = SessionOptions::builder()
        .fetch_timeout(Duration::from_millis(20))
        .build();
    let session = Session::new(storage, ObjectKey::new("a.h5").unwrap(), options);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(
        err,
        ReadError::IOFailure(IOFailure::Timeout { .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn session_filesystem_store() {
    use cloud_asdf::storage::store::AsyncFilesystemStore;

    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data/layouts.h5"), layouts_file()).unwrap();
    let store = Arc::new(AsyncFilesystemStore::new(dir.path()).unwrap());

    let session = cloud_asdf::open(
        store.clone(),
        ObjectKey::new("data/layouts.h5").unwrap(),
        options(),
    )
    .await
    .unwrap();
    let array = session
        .read_dataset("/edge", Some(&slice(&[(0, 2, 1), (0, 7, 1)])))
        .await
        .unwrap();
    assert_eq!(array.as_slice::<i32>().unwrap(), &int32_grid(25, 7)[..14]);

    let err = cloud_asdf::open(store, ObjectKey::new("data/missing.h5").unwrap(), options())
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::IOFailure(IOFailure::NotFound(_))));
}

#[cfg(feature = "object_store")]
#[tokio::test]
async fn session_object_store() {
    use cloud_asdf::storage::store::AsyncObjectStore;
    use object_store::{memory::InMemory, path::Path, ObjectStore};

    let object_store = InMemory::new();
    object_store
        .put(
            &Path::from("bucket/layouts.h5"),
            Bytes::from(layouts_file()).into(),
        )
        .await
        .unwrap();
    let storage = Arc::new(AsyncObjectStore::new(object_store));
    let session = Session::open(
        storage,
        ObjectKey::new("bucket/layouts.h5").unwrap(),
        options(),
    )
    .await
    .unwrap();
    let names = session.read_dataset("/names", None).await.unwrap();
    assert_eq!(names.strings().unwrap(), &["alpha", "", "gamma"]);
    assert_eq!(session.object_size().unwrap(), layouts_file().len() as u64);
}
