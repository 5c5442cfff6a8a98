//! Dataset reads.
//!
//! A [`DatasetReader`] resolves a dataset path to its [`DatasetNode`] and reads slices of it:
//!  - contiguous datasets fetch the single byte span between the first and last selected elements,
//!  - chunked datasets fetch only the chunks holding a selected element (in one batch), decode them in parallel through the filter pipeline and crop them into the output,
//!  - unallocated storage and chunks read as the fill value.
//!
//! A read either returns the complete array or an error, never a partially filled array.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use itertools::{izip, Itertools};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    array::{Array, DataType},
    array_subset::{ChunkSelection, SliceRequest},
    byte_range::ByteRange,
    error::ReadError,
    filter::{filter_name, DecodeOptions, FilterPipeline},
    format::{
        DataLayout, DataspaceKind, Datatype, FormatError, FormatParser, GlobalHeapReference,
        UNDEFINED_ADDRESS,
    },
    node::{DatasetNode, NodePath, StructuralNode},
};

/// A filter of a dataset filter pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterInfo {
    /// The filter identifier.
    pub id: u16,
    /// The filter name.
    pub name: String,
}

/// A summary of a dataset, available without reading its elements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetInfo {
    /// The dataset path.
    pub path: String,
    /// The dataset shape.
    pub shape: Vec<u64>,
    /// The element data type.
    pub data_type: DataType,
    /// The storage layout: `compact`, `contiguous` or `chunked`.
    pub layout: &'static str,
    /// The chunk shape of a chunked dataset.
    pub chunk_shape: Option<Vec<u64>>,
    /// The filter pipeline, in the order filters were applied when writing.
    pub filters: Vec<FilterInfo>,
    /// The attribute names.
    pub attributes: Vec<String>,
}

/// Reads slices of one dataset.
pub struct DatasetReader<'a> {
    parser: FormatParser<'a>,
    path: NodePath,
    node: Arc<DatasetNode>,
    options: DecodeOptions,
}

impl<'a> DatasetReader<'a> {
    /// Resolve the dataset at `path`.
    ///
    /// # Errors
    /// Returns [`ReadError::PathNotFound`] if `path` does not exist, [`ReadError::UnexpectedNodeKind`] if it is not a dataset, or the error of resolving it.
    pub async fn open(parser: FormatParser<'a>, path: &NodePath) -> Result<Self, ReadError> {
        let (_, node) = parser.resolve(path).await?;
        let StructuralNode::Dataset(node) = node else {
            return Err(ReadError::UnexpectedNodeKind {
                path: path.to_string(),
                expected: "dataset",
            });
        };
        let options = DecodeOptions::new(parser.validate_checksums());
        Ok(Self {
            parser,
            path: path.clone(),
            node,
            options,
        })
    }

    /// Return the dataset node.
    #[must_use]
    pub fn node(&self) -> &DatasetNode {
        &self.node
    }

    /// Return a summary of the dataset.
    ///
    /// # Errors
    /// Returns [`ReadError::FormatError`] if the datatype cannot be read.
    pub fn info(&self) -> Result<DatasetInfo, ReadError> {
        let node = &self.node;
        Ok(DatasetInfo {
            path: self.path.to_string(),
            shape: node.shape.clone(),
            data_type: self.data_type()?,
            layout: node.layout.name(),
            chunk_shape: node.chunk_shape.clone(),
            filters: node
                .filters
                .iter()
                .map(|filter| FilterInfo {
                    id: filter.id,
                    name: filter
                        .name
                        .clone()
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| filter_name(filter.id).to_string()),
                })
                .collect(),
            attributes: node
                .attributes
                .iter()
                .map(|attribute| attribute.name.clone())
                .collect(),
        })
    }

    fn data_type(&self) -> Result<DataType, ReadError> {
        self.node
            .datatype
            .data_type()
            .map_err(|err| ReadError::format(self.path.to_string(), err))
    }

    fn invalid(&self, message: String) -> ReadError {
        ReadError::format(self.path.to_string(), FormatError::Invalid(message))
    }

    /// Read `slice` of the dataset, or the whole dataset if `slice` is [`None`].
    ///
    /// The shape of the returned array is the shape of the slice after step subsampling.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if
    ///  - the slice is out of bounds ([`ReadError::OutOfRange`]),
    ///  - the filter pipeline includes an unsupported filter ([`ReadError::UnsupportedFilter`]),
    ///  - the dataset storage is invalid or a chunk cannot be decoded, or
    ///  - a fetch fails.
    pub async fn read(&self, slice: Option<&SliceRequest>) -> Result<Array, ReadError> {
        let node = &self.node;
        let data_type = self.data_type()?;
        let element_size = node.element_size();
        if element_size == 0 {
            return Err(self.invalid("dataset elements have zero size".to_string()));
        }

        if node.num_elements() == 0 {
            if let Some(slice) = slice {
                slice.validate(&node.shape)?;
            }
            let shape = match node.dataspace_kind {
                DataspaceKind::Null => vec![0],
                DataspaceKind::Scalar | DataspaceKind::Simple => node.shape.clone(),
            };
            return self.decode_elements(shape, &[]).await;
        }

        let slice = slice
            .cloned()
            .unwrap_or_else(|| SliceRequest::full(&node.shape));
        slice.validate(&node.shape)?;
        let output_shape = slice.shape();
        let output_len = usize::try_from(slice.num_elements())
            .ok()
            .and_then(|count| count.checked_mul(element_size))
            .ok_or_else(|| self.invalid(format!("slice {slice} is too large")))?;
        let fill = node.fill_value.element_bytes(element_size);
        let mut output = fill.repeat(output_len / element_size);

        tracing::debug!(
            path = %self.path,
            %slice,
            layout = node.layout.name(),
            data_type = %data_type,
            "read dataset"
        );
        match &node.layout {
            DataLayout::Compact { data } => {
                let needed = node
                    .num_elements()
                    .checked_mul(element_size as u64)
                    .ok_or_else(|| self.invalid("compact storage size overflows".to_string()))?;
                if (data.len() as u64) < needed {
                    return Err(self.invalid(format!(
                        "compact storage has {} bytes, dataset needs {needed}",
                        data.len()
                    )));
                }
                self.copy_selections(
                    &slice.chunk_selections(&node.shape),
                    data,
                    &node.shape,
                    0,
                    &mut output,
                    &output_shape,
                )?;
            }
            DataLayout::Contiguous { address, size } => {
                if *address != UNDEFINED_ADDRESS {
                    self.read_contiguous(&slice, *address, *size, &mut output, &output_shape)
                        .await?;
                }
            }
            DataLayout::Chunked { .. } => {
                self.read_chunked(&slice, &mut output, &output_shape)
                    .await?;
            }
        }

        self.decode_elements(output_shape, &output).await
    }

    async fn read_contiguous(
        &self,
        slice: &SliceRequest,
        address: u64,
        size: u64,
        output: &mut [u8],
        output_shape: &[u64],
    ) -> Result<(), ReadError> {
        let node = &self.node;
        let element_size = node.element_size() as u64;
        let (first, last) = slice.linear_bounds(&node.shape);
        let needed = node
            .num_elements()
            .checked_mul(element_size)
            .ok_or_else(|| self.invalid("contiguous storage size overflows".to_string()))?;
        if size < needed {
            return Err(self.invalid(format!(
                "contiguous storage has {size} bytes, dataset needs {needed}"
            )));
        }
        let offset = address
            .checked_add(first * element_size)
            .ok_or_else(|| self.invalid(format!("contiguous address {address} overflows")))?;
        let length = (last - first + 1) * element_size;
        let bytes = self
            .parser
            .read_declared("contiguous dataset storage", offset, length)
            .await
            .map_err(|err| err.in_path(&self.path))?;
        tracing::trace!(offset, length, "contiguous span");
        self.copy_selections(
            &slice.chunk_selections(&node.shape),
            &bytes,
            &node.shape,
            first,
            output,
            output_shape,
        )
    }

    async fn read_chunked(
        &self,
        slice: &SliceRequest,
        output: &mut [u8],
        output_shape: &[u64],
    ) -> Result<(), ReadError> {
        let node = &self.node;
        let Some(chunk_shape) = node.chunk_shape.as_deref() else {
            return Err(self.invalid("chunked dataset has no chunk shape".to_string()));
        };
        let pipeline = FilterPipeline::new(&node.filters, node.element_size())
            .map_err(|err| ReadError::filter(self.path.as_str(), err))?;
        let chunk_len = chunk_shape
            .iter()
            .product::<u64>()
            .checked_mul(node.element_size() as u64)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| self.invalid(format!("chunk shape {chunk_shape:?} is too large")))?;

        let selections = slice.chunk_selections(chunk_shape);
        let requested: BTreeSet<Vec<u64>> = selections
            .iter()
            .map(|selection| selection.chunk_offset(chunk_shape))
            .collect();
        let locations = self
            .parser
            .chunk_locations(node, &requested)
            .await
            .map_err(|err| err.in_path(&self.path))?;

        let mut selections_by_offset: BTreeMap<Vec<u64>, &ChunkSelection> = BTreeMap::new();
        for selection in &selections {
            selections_by_offset.insert(selection.chunk_offset(chunk_shape), selection);
        }
        let allocated = locations
            .iter()
            .filter_map(|(offset, location)| {
                selections_by_offset
                    .get(offset)
                    .map(|selection| (*selection, *location))
            })
            .collect_vec();
        tracing::debug!(
            path = %self.path,
            chunks = selections.len(),
            allocated = allocated.len(),
            "chunk selection"
        );
        if allocated.is_empty() {
            return Ok(());
        }

        let byte_ranges: Vec<ByteRange> = allocated
            .iter()
            .map(|(_, location)| location.byte_range)
            .collect();
        let encoded = self
            .parser
            .read_ranges("chunk", &byte_ranges)
            .await
            .map_err(|err| err.in_path(&self.path))?;

        let options = self.options;
        let decoded = izip!(encoded, &allocated)
            .collect_vec()
            .into_par_iter()
            .map(|(bytes, (_, location))| {
                pipeline.decode_chunk(bytes.to_vec(), location.filter_mask, &options)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ReadError::filter(self.path.as_str(), err))?;

        for (chunk, (selection, location)) in std::iter::zip(decoded, &allocated) {
            if chunk.len() != chunk_len {
                return Err(self.invalid(format!(
                    "chunk at {} decoded to {} bytes, expected {chunk_len}",
                    location.byte_range,
                    chunk.len()
                )));
            }
            self.copy_selections(
                std::slice::from_ref(*selection),
                &chunk,
                chunk_shape,
                0,
                output,
                output_shape,
            )?;
        }
        Ok(())
    }

    fn copy_selections(
        &self,
        selections: &[ChunkSelection],
        source: &[u8],
        source_shape: &[u64],
        source_element_offset: u64,
        output: &mut [u8],
        output_shape: &[u64],
    ) -> Result<(), ReadError> {
        for selection in selections {
            selection
                .copy(
                    source,
                    source_shape,
                    source_element_offset,
                    self.node.element_size(),
                    output,
                    output_shape,
                )
                .map_err(|err| self.invalid(err.to_string()))?;
        }
        Ok(())
    }

    async fn decode_elements(&self, shape: Vec<u64>, bytes: &[u8]) -> Result<Array, ReadError> {
        decode_elements(&self.parser, &self.path, &self.node.datatype, shape, bytes).await
    }
}

/// Decode the stored bytes of elements of `datatype` into an [`Array`] of `shape`.
///
/// Variable-length strings are resolved through their global heap collections.
pub(crate) async fn decode_elements(
    parser: &FormatParser<'_>,
    path: &NodePath,
    datatype: &Datatype,
    shape: Vec<u64>,
    bytes: &[u8],
) -> Result<Array, ReadError> {
    let data_type = datatype
        .data_type()
        .map_err(|err| ReadError::format(path.to_string(), err))?;
    if data_type != DataType::VarString {
        return Ok(Array::from_bytes(
            shape,
            data_type,
            bytes,
            datatype.byte_order(),
        )?);
    }

    let sizes = parser.superblock().sizes();
    let element_size = datatype.size();
    if element_size == 0 {
        return Err(ReadError::format(
            path.to_string(),
            FormatError::Invalid("variable-length elements have zero size".to_string()),
        ));
    }
    let references = bytes
        .chunks_exact(element_size)
        .map(|element| GlobalHeapReference::decode(element, sizes))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ReadError::format(path.to_string(), err))?;

    let mut collections = BTreeMap::new();
    for address in references
        .iter()
        .filter(|reference| !reference.is_null())
        .map(|reference| reference.collection_address)
        .unique()
    {
        collections.insert(address, parser.global_heap(address).await?);
    }

    let strings = references
        .iter()
        .map(|reference| {
            if reference.is_null() {
                return Ok(String::new());
            }
            let object = collections
                .get(&reference.collection_address)
                .and_then(|collection| collection.object(reference.index))
                .ok_or_else(|| {
                    ReadError::format(
                        path.to_string(),
                        FormatError::Invalid(format!(
                            "global heap collection {} has no object {}",
                            reference.collection_address, reference.index
                        )),
                    )
                })?;
            let end = object
                .iter()
                .position(|byte| *byte == 0)
                .unwrap_or(object.len());
            String::from_utf8(object[..end].to_vec()).map_err(|_| {
                ReadError::format(
                    path.to_string(),
                    FormatError::Invalid(format!(
                        "global heap object {} is not valid UTF-8",
                        reference.index
                    )),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Array::from_strings(shape, DataType::VarString, strings)?)
}
