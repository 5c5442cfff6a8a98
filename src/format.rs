//! Decoding of HDF5 structural bytes.
//!
//! The submodules decode individual structures (superblock, object headers and their messages, B-trees, heaps) from bytes.
//! The [`FormatParser`] drives them: it fetches exactly the bytes each decoding step needs, reading fixed size headers first to learn the length of variable size regions, and publishes decoded [`StructuralNode`]s to the session [`NodeCache`].
//!
//! Group and B-tree traversal is iterative over explicit work lists, and each level of a B-tree is fetched as one batch.

mod attribute;
mod btree_v1;
mod checksum;
mod cursor;
mod data_layout;
mod dataspace;
mod datatype;
mod fill_value;
mod filter_pipeline;
mod format_error;
mod global_heap;
mod link;
mod object_header;
mod superblock;
mod symbol_table;

use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    sync::Arc,
};

use bytes::Bytes;
use itertools::izip;
use tokio_util::sync::CancellationToken;

pub use attribute::AttributeMessage;
pub use btree_v1::{BTreeV1Header, BTreeV1Node, BTreeV1Type, ChunkKey};
pub use checksum::lookup3;
pub use data_layout::{ChunkIndex, DataLayout};
pub use dataspace::{Dataspace, DataspaceKind};
pub use datatype::{ByteOrder, CharacterSet, Datatype};
pub use fill_value::FillValue;
pub use filter_pipeline::{decode_filter_pipeline, FilterDescription};
pub use format_error::FormatError;
pub use global_heap::{GlobalHeapCollection, GlobalHeapReference};
pub use link::{Link, LinkInfo, LinkTarget};
pub use object_header::{
    HeaderMessage, ObjectHeaderPrefix, RawMessage, OBJECT_HEADER_PREFIX_FETCH_SIZE,
};
pub use superblock::{Superblock, HDF5_SIGNATURE, SUPERBLOCK_FETCH_SIZE};
pub use symbol_table::{
    decode_symbol_node_header, decode_symbol_table_entries, local_heap_string,
    symbol_table_entry_size, LocalHeap, SymbolTableEntry, SymbolTableMessage,
    SYMBOL_NODE_HEADER_SIZE,
};

use crate::{
    byte_range::ByteRange,
    chunk_cache::{CachedFetcher, NodeCache},
    error::{OutOfRangeCause, ReadError},
    node::{
        is_dataset, AttributeNode, DatasetNode, GroupChild, GroupNode, NodePath, StructuralNode,
    },
};

/// The undefined address (all bits set).
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

/// The stored location of one chunk of a chunked dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    /// The absolute byte range of the stored (filtered) chunk.
    pub byte_range: ByteRange,
    /// The mask of filters skipped for the chunk.
    pub filter_mask: u32,
}

/// Decodes the structural nodes of one HDF5 container on demand.
#[derive(Clone, Copy)]
pub struct FormatParser<'a> {
    fetcher: &'a CachedFetcher,
    nodes: &'a NodeCache,
    superblock: &'a Superblock,
    validate_checksums: bool,
    cancel: Option<&'a CancellationToken>,
}

/// Read the superblock of the object behind `fetcher`.
///
/// The signature is searched for at offset 0, then 512, 1024, 2048 and so on.
///
/// # Errors
/// Returns [`ReadError::FormatError`] if the signature is not found or the superblock is invalid, or a fetch error.
pub async fn read_superblock(
    fetcher: &CachedFetcher,
    validate_checksums: bool,
    cancel: Option<&CancellationToken>,
) -> Result<Superblock, ReadError> {
    let size = fetcher.object_size();
    for address in Superblock::candidate_addresses(size) {
        let length = SUPERBLOCK_FETCH_SIZE.min(size - address);
        let data = fetcher.read(ByteRange::new(address, length), cancel).await?;
        if Superblock::has_signature(&data) {
            let superblock = Superblock::decode(&data, address, validate_checksums)
                .map_err(|err| ReadError::format("superblock", err))?;
            tracing::debug!(
                address,
                version = superblock.version,
                root = superblock.root_object_header_address,
                "superblock"
            );
            return Ok(superblock);
        }
    }
    Err(ReadError::format("superblock", FormatError::SignatureNotFound))
}

fn header_context(address: u64) -> impl Fn(FormatError) -> ReadError {
    move |err| ReadError::format(format!("object header at address {address}"), err)
}

impl<'a> FormatParser<'a> {
    /// Create a new format parser.
    #[must_use]
    pub fn new(
        fetcher: &'a CachedFetcher,
        nodes: &'a NodeCache,
        superblock: &'a Superblock,
        validate_checksums: bool,
    ) -> Self {
        Self {
            fetcher,
            nodes,
            superblock,
            validate_checksums,
            cancel: None,
        }
    }

    /// Issue no further fetches once `cancel` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Option<&'a CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Return the superblock.
    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        self.superblock
    }

    /// Returns true if checksums are validated.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    fn sizes(&self) -> (u8, u8) {
        self.superblock.sizes()
    }

    /// Convert an address relative to the base address to an absolute object offset.
    ///
    /// # Errors
    /// Returns [`ReadError::FormatError`] if `address` is undefined or overflows.
    pub fn absolute(&self, address: u64) -> Result<u64, ReadError> {
        if address == UNDEFINED_ADDRESS {
            return Err(ReadError::format(
                "address",
                FormatError::Invalid("undefined address".to_string()),
            ));
        }
        self.superblock
            .base_address
            .checked_add(address)
            .ok_or_else(|| {
                ReadError::format(
                    "address",
                    FormatError::Invalid(format!("address {address} overflows")),
                )
            })
    }

    /// Validate a byte range whose length was declared by a structure at `address`.
    fn declared_range(
        &self,
        structure: &'static str,
        address: u64,
        length: u64,
    ) -> Result<ByteRange, ReadError> {
        let offset = self.absolute(address)?;
        let byte_range = ByteRange::new(offset, length);
        let object_size = self.fetcher.object_size();
        if offset >= object_size && length > 0 {
            Err(OutOfRangeCause::CorruptPointer {
                byte_range,
                object_size,
            }
            .into())
        } else if byte_range.validate(object_size).is_err() {
            Err(ReadError::format(
                structure,
                FormatError::LengthPastEnd {
                    structure,
                    address,
                    length,
                    object_size,
                },
            ))
        } else {
            Ok(byte_range)
        }
    }

    /// Read `length` bytes of a structure at `address`, where `length` was declared by the file.
    ///
    /// # Errors
    /// Returns [`ReadError::OutOfRange`] if `address` is past the end of the object, [`ReadError::FormatError`] if the declared length is, or a fetch error.
    pub async fn read_declared(
        &self,
        structure: &'static str,
        address: u64,
        length: u64,
    ) -> Result<Bytes, ReadError> {
        let byte_range = self.declared_range(structure, address, length)?;
        Ok(self.fetcher.read(byte_range, self.cancel).await?)
    }

    /// Read structures at `(address, length)` pairs concurrently, returning their bytes positionally.
    ///
    /// # Errors
    /// See [`read_declared`](Self::read_declared).
    pub async fn read_many_declared(
        &self,
        structure: &'static str,
        regions: &[(u64, u64)],
    ) -> Result<Vec<Bytes>, ReadError> {
        let byte_ranges = regions
            .iter()
            .map(|(address, length)| self.declared_range(structure, *address, *length))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.fetcher.read_many(&byte_ranges, self.cancel).await?)
    }

    /// Read absolute byte ranges (such as chunks) concurrently, returning their bytes positionally.
    ///
    /// # Errors
    /// Returns [`ReadError::FormatError`] if a byte range extends past the end of the object, or a fetch error.
    pub async fn read_ranges(
        &self,
        structure: &'static str,
        byte_ranges: &[ByteRange],
    ) -> Result<Vec<Bytes>, ReadError> {
        let object_size = self.fetcher.object_size();
        for byte_range in byte_ranges {
            if byte_range.validate(object_size).is_err() {
                return Err(ReadError::format(
                    structure,
                    FormatError::LengthPastEnd {
                        structure,
                        address: byte_range.offset(),
                        length: byte_range.length(),
                        object_size,
                    },
                ));
            }
        }
        Ok(self.fetcher.read_many(byte_ranges, self.cancel).await?)
    }

    /// Decode the object header at `address`, following continuation blocks.
    ///
    /// Returns the byte range of the first header block and the decoded messages in storage order, excluding continuation messages.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the object header is invalid, refers to bytes past the end of the object, or a fetch fails.
    pub async fn object_header(
        &self,
        address: u64,
    ) -> Result<(ByteRange, Vec<HeaderMessage>), ReadError> {
        let context = header_context(address);
        let offset = self.absolute(address)?;
        let object_size = self.fetcher.object_size();
        if offset >= object_size {
            return Err(OutOfRangeCause::CorruptPointer {
                byte_range: ByteRange::new(offset, OBJECT_HEADER_PREFIX_FETCH_SIZE),
                object_size,
            }
            .into());
        }
        let prefix_range = ByteRange::new(
            offset,
            OBJECT_HEADER_PREFIX_FETCH_SIZE.min(object_size - offset),
        );
        let prefix_bytes = self.fetcher.read(prefix_range, self.cancel).await?;
        let prefix = ObjectHeaderPrefix::decode(&prefix_bytes, address).map_err(&context)?;

        let total_size = prefix.total_size();
        let block = match usize::try_from(total_size) {
            Ok(total_size) if total_size <= prefix_bytes.len() => prefix_bytes.slice(..total_size),
            _ => {
                self.read_declared("object header", address, total_size)
                    .await?
            }
        };

        let sizes = self.sizes();
        let mut messages = Vec::new();
        let mut continuations = VecDeque::new();
        let mut visited = HashSet::from([address]);
        let mut raw_messages = prefix
            .first_block_messages(&block, self.validate_checksums)
            .map_err(&context)?;
        loop {
            for raw in &raw_messages {
                match HeaderMessage::decode(raw, sizes).map_err(&context)? {
                    HeaderMessage::Continuation { address, length } => {
                        if !visited.insert(address) {
                            return Err(context(FormatError::Invalid(format!(
                                "object header continuation loop at address {address}"
                            ))));
                        }
                        continuations.push_back((address, length));
                    }
                    message => messages.push(message),
                }
            }
            let Some((block_address, length)) = continuations.pop_front() else {
                break;
            };
            let data = self
                .read_declared("object header continuation block", block_address, length)
                .await?;
            raw_messages = prefix
                .continuation_messages(&data, block_address, self.validate_checksums)
                .map_err(&context)?;
        }
        Ok((ByteRange::new(offset, total_size), messages))
    }

    /// Return the node decoded from the object header at `address`, decoding it if it is not cached.
    ///
    /// An object header with a data layout message is a dataset, anything else is a group.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the object header or group structures are invalid, or a fetch fails.
    pub async fn node(&self, address: u64) -> Result<StructuralNode, ReadError> {
        if let Some(node) = self.nodes.node(address) {
            return Ok(node);
        }
        let (byte_range, messages) = self.object_header(address).await?;
        let node = if is_dataset(&messages) {
            let dataset = DatasetNode::from_messages(byte_range, messages)
                .map_err(header_context(address))?;
            StructuralNode::Dataset(Arc::new(dataset))
        } else {
            StructuralNode::Group(Arc::new(self.group(address, byte_range, messages).await?))
        };
        self.nodes.insert_node(address, node.clone());
        Ok(node)
    }

    async fn group(
        &self,
        address: u64,
        byte_range: ByteRange,
        messages: Vec<HeaderMessage>,
    ) -> Result<GroupNode, ReadError> {
        let mut symbol_table = None;
        let mut links = Vec::new();
        let mut attributes = Vec::new();
        let mut dense = false;
        for message in messages {
            match message {
                HeaderMessage::SymbolTable(message) => {
                    symbol_table.get_or_insert(message);
                }
                HeaderMessage::Link(link) => links.push(GroupChild {
                    name: link.name,
                    target: link.target,
                }),
                HeaderMessage::LinkInfo(info) => dense |= info.is_dense(),
                HeaderMessage::Attribute(message) => {
                    attributes.push(Arc::new(AttributeNode::from(message)));
                }
                _ => {}
            }
        }
        let children = if let Some(symbol_table) = symbol_table {
            self.symbol_table_children(symbol_table).await?
        } else if dense {
            tracing::warn!(address, "dense link storage is not supported");
            return Err(header_context(address)(FormatError::Unsupported(
                "dense link storage".to_string(),
            )));
        } else {
            links
        };
        Ok(GroupNode::new(byte_range, children, attributes))
    }

    /// Read the children of an old-style group in storage order.
    async fn symbol_table_children(
        &self,
        symbol_table: SymbolTableMessage,
    ) -> Result<Vec<GroupChild>, ReadError> {
        let sizes = self.sizes();
        let heap_address = symbol_table.heap_address;
        let heap_context = |err| ReadError::format(format!("local heap at address {heap_address}"), err);
        let heap_header = self
            .read_declared("local heap", heap_address, LocalHeap::header_size(sizes))
            .await?;
        let heap = LocalHeap::decode(&heap_header, heap_address, sizes).map_err(heap_context)?;
        let heap_data = self
            .read_declared("local heap data segment", heap.data_address, heap.data_size)
            .await?;

        let symbol_nodes = self
            .btree_v1_leaves(symbol_table.btree_address, BTreeV1Type::Group)
            .await?;

        let header_size = SYMBOL_NODE_HEADER_SIZE;
        let regions: Vec<_> = symbol_nodes
            .iter()
            .map(|address| (*address, header_size))
            .collect();
        let headers = self
            .read_many_declared("symbol table node", &regions)
            .await?;
        let counts = std::iter::zip(&symbol_nodes, &headers)
            .map(|(address, header)| {
                decode_symbol_node_header(header, *address).map_err(|err| {
                    ReadError::format(format!("symbol table node at address {address}"), err)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let regions = std::iter::zip(&symbol_nodes, &counts)
            .map(|(address, count)| {
                address
                    .checked_add(header_size)
                    .map(|address| {
                        (
                            address,
                            u64::from(*count) * symbol_table_entry_size(sizes),
                        )
                    })
                    .ok_or_else(|| {
                        ReadError::format(
                            "symbol table node",
                            FormatError::Invalid(format!("address {address} overflows")),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let bodies = self
            .read_many_declared("symbol table node", &regions)
            .await?;

        let mut children = Vec::new();
        for (address, count, body) in izip!(&symbol_nodes, counts, bodies) {
            let context =
                |err| ReadError::format(format!("symbol table node at address {address}"), err);
            for entry in decode_symbol_table_entries(&body, count, sizes).map_err(context)? {
                let name = local_heap_string(&heap_data, entry.name_offset).map_err(context)?;
                let target = match entry.soft_link_offset {
                    Some(offset) => {
                        LinkTarget::Soft(local_heap_string(&heap_data, offset).map_err(context)?)
                    }
                    None => LinkTarget::Hard(entry.object_header_address),
                };
                children.push(GroupChild { name, target });
            }
        }
        Ok(children)
    }

    /// Fetch the nodes of a version 1 B-tree level by level, calling `visit` with each decoded node.
    ///
    /// `visit` returns the children of an internal node to descend into.
    async fn btree_v1_walk(
        &self,
        root: u64,
        node_type: BTreeV1Type,
        chunk_dimensionality: usize,
        mut visit: impl FnMut(u64, &BTreeV1Node) -> Result<Vec<u64>, FormatError>,
    ) -> Result<(), ReadError> {
        let sizes = self.sizes();
        let header_size = BTreeV1Header::size(sizes);
        let mut visited = HashSet::new();
        let mut level = vec![root];
        while !level.is_empty() {
            for address in &level {
                if !visited.insert(*address) {
                    return Err(ReadError::format(
                        "version 1 B-tree",
                        FormatError::Invalid(format!("B-tree node {address} is visited twice")),
                    ));
                }
            }
            let regions: Vec<_> = level.iter().map(|address| (*address, header_size)).collect();
            let headers = self
                .read_many_declared("version 1 B-tree node", &regions)
                .await?;
            let headers = std::iter::zip(&level, headers)
                .map(|(address, data)| {
                    let header = BTreeV1Header::decode(&data, *address, sizes)?;
                    if header.node_type == node_type {
                        Ok(header)
                    } else {
                        Err(FormatError::Invalid(format!(
                            "B-tree node at address {address} has type {:?}, expected {node_type:?}",
                            header.node_type
                        )))
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| ReadError::format("version 1 B-tree node", err))?;

            let regions = std::iter::zip(&level, &headers)
                .map(|(address, header)| {
                    (
                        address.saturating_add(header_size),
                        header.body_size(sizes, chunk_dimensionality),
                    )
                })
                .collect::<Vec<_>>();
            let bodies = self
                .read_many_declared("version 1 B-tree node", &regions)
                .await?;

            let mut next = Vec::new();
            for (address, header, body) in izip!(&level, headers, bodies) {
                let children = header
                    .decode_body(&body, sizes, chunk_dimensionality)
                    .and_then(|node| visit(*address, &node))
                    .map_err(|err| {
                        ReadError::format(format!("version 1 B-tree node at address {address}"), err)
                    })?;
                next.extend(children);
            }
            level = next;
        }
        Ok(())
    }

    /// Return the leaf children of a version 1 B-tree in key order.
    async fn btree_v1_leaves(
        &self,
        root: u64,
        node_type: BTreeV1Type,
    ) -> Result<Vec<u64>, ReadError> {
        let mut leaves = Vec::new();
        self.btree_v1_walk(root, node_type, 0, |_, node| {
            if node.header.level == 0 {
                leaves.extend_from_slice(&node.children);
                Ok(vec![])
            } else {
                Ok(node.children.clone())
            }
        })
        .await?;
        Ok(leaves)
    }

    /// Resolve `path` to the address of its object header and its node.
    ///
    /// Resolution is iterative from the deepest previously resolved ancestor.
    ///
    /// # Errors
    /// Returns [`ReadError::PathNotFound`] if a path component does not exist or is not a group, [`ReadError::FormatError`] (with the path as context) if a structure is invalid or a link cannot be followed, or a fetch error.
    pub async fn resolve(&self, path: &NodePath) -> Result<(u64, StructuralNode), ReadError> {
        self.resolve_inner(path)
            .await
            .map_err(|err| err.in_path(path))
    }

    async fn resolve_inner(&self, path: &NodePath) -> Result<(u64, StructuralNode), ReadError> {
        if let Some(address) = self.nodes.path(path) {
            return Ok((address, self.node(address).await?));
        }

        let components: Vec<&str> = path.components().collect();
        let mut current = NodePath::root();
        let mut address = self.superblock.root_object_header_address;
        let mut start = 0;
        for (depth, _) in components.iter().enumerate().rev() {
            let ancestor = NodePath::new(&components[..=depth].join("/"))?;
            if let Some(cached) = self.nodes.path(&ancestor) {
                current = ancestor;
                address = cached;
                start = depth + 1;
                break;
            }
        }

        let mut node = self.node(address).await?;
        for component in &components[start..] {
            let StructuralNode::Group(group) = &node else {
                return Err(ReadError::PathNotFound(path.to_string()));
            };
            let child = group
                .child(component)
                .ok_or_else(|| ReadError::PathNotFound(path.to_string()))?;
            current = current.child(component)?;
            address = match &child.target {
                LinkTarget::Hard(address) => *address,
                LinkTarget::Soft(target) => {
                    return Err(ReadError::format(
                        current.to_string(),
                        FormatError::Unsupported(format!("soft link to {target}")),
                    ))
                }
                LinkTarget::External { file, path } => {
                    return Err(ReadError::format(
                        current.to_string(),
                        FormatError::Unsupported(format!("external link to {file}:{path}")),
                    ))
                }
            };
            node = self.node(address).await?;
            self.nodes.insert_path(current.clone(), address);
        }
        Ok((address, node))
    }

    /// Return the stored locations of the chunks of `dataset` whose element offsets are in `requested`.
    ///
    /// Requested chunks that have not been allocated are absent from the result.
    /// Only the B-tree nodes whose key ranges can contain a requested chunk are fetched.
    ///
    /// # Errors
    /// Returns [`ReadError::FormatError`] if the chunk index is invalid (such as misaligned or duplicate chunk offsets), or a fetch error.
    pub async fn chunk_locations(
        &self,
        dataset: &DatasetNode,
        requested: &BTreeSet<Vec<u64>>,
    ) -> Result<BTreeMap<Vec<u64>, ChunkLocation>, ReadError> {
        let DataLayout::Chunked { chunk_dims, index } = &dataset.layout else {
            return Ok(BTreeMap::new());
        };
        let Some(chunk_shape) = &dataset.chunk_shape else {
            return Ok(BTreeMap::new());
        };
        if index.is_unallocated() || requested.is_empty() {
            return Ok(BTreeMap::new());
        }
        let chunk_bytes = chunk_shape
            .iter()
            .product::<u64>()
            .checked_mul(dataset.element_size() as u64)
            .ok_or_else(|| {
                ReadError::format(
                    "chunk index",
                    FormatError::Invalid(format!("chunk shape {chunk_shape:?} overflows")),
                )
            })?;

        match index {
            ChunkIndex::BTreeV1 { address } => {
                self.btree_chunk_locations(*address, chunk_dims.len(), dataset, requested)
                    .await
            }
            ChunkIndex::SingleChunk {
                address,
                filtered_size,
                filter_mask,
            } => {
                let origin = vec![0; chunk_shape.len()];
                let mut locations = BTreeMap::new();
                if requested.contains(&origin) {
                    let byte_range =
                        ByteRange::new(self.absolute(*address)?, filtered_size.unwrap_or(chunk_bytes));
                    locations.insert(
                        origin,
                        ChunkLocation {
                            byte_range,
                            filter_mask: *filter_mask,
                        },
                    );
                }
                Ok(locations)
            }
            ChunkIndex::Implicit { address } => {
                let base = self.absolute(*address)?;
                let grid: Vec<u64> = std::iter::zip(&dataset.shape, chunk_shape)
                    .map(|(extent, chunk)| extent.div_ceil(*chunk))
                    .collect();
                requested
                    .iter()
                    .map(|offsets| {
                        let linear = std::iter::zip(offsets, chunk_shape)
                            .zip(&grid)
                            .fold(0u64, |linear, ((offset, chunk), count)| {
                                linear * count + offset / chunk
                            });
                        let start = linear
                            .checked_mul(chunk_bytes)
                            .and_then(|start| start.checked_add(base))
                            .ok_or_else(|| {
                                ReadError::format(
                                    "implicit chunk index",
                                    FormatError::Invalid(format!(
                                        "chunk {offsets:?} address overflows"
                                    )),
                                )
                            })?;
                        Ok((
                            offsets.clone(),
                            ChunkLocation {
                                byte_range: ByteRange::new(start, chunk_bytes),
                                filter_mask: 0,
                            },
                        ))
                    })
                    .collect()
            }
        }
    }

    async fn btree_chunk_locations(
        &self,
        root: u64,
        chunk_dimensionality: usize,
        dataset: &DatasetNode,
        requested: &BTreeSet<Vec<u64>>,
    ) -> Result<BTreeMap<Vec<u64>, ChunkLocation>, ReadError> {
        let chunk_shape = dataset.chunk_shape.as_deref().unwrap_or_default();
        let base_address = self.superblock.base_address;
        let mut locations = BTreeMap::new();
        self.btree_v1_walk(
            root,
            BTreeV1Type::Chunk,
            chunk_dimensionality,
            |address, node| {
                let keys = &node.chunk_keys;
                if node.header.level > 0 {
                    let mut children = Vec::new();
                    for (i, child) in node.children.iter().enumerate() {
                        let (lower, upper) = (&keys[i].offsets, &keys[i + 1].offsets);
                        if lower > upper {
                            return Err(FormatError::Invalid(format!(
                                "B-tree node {address} keys {lower:?} and {upper:?} are out of order"
                            )));
                        }
                        if requested.range(lower.clone()..=upper.clone()).next().is_some() {
                            children.push(*child);
                        }
                    }
                    return Ok(children);
                }
                for (key, child) in std::iter::zip(keys, &node.children) {
                    if key.offsets.len() != chunk_shape.len()
                        || std::iter::zip(&key.offsets, chunk_shape)
                            .any(|(offset, chunk)| offset % chunk != 0)
                    {
                        return Err(FormatError::Invalid(format!(
                            "chunk offset {:?} in B-tree node {address} is not aligned to the chunk shape {chunk_shape:?}",
                            key.offsets
                        )));
                    }
                    if std::iter::zip(&key.offsets, &dataset.shape)
                        .any(|(offset, extent)| offset >= extent)
                    {
                        continue;
                    }
                    if !requested.contains(&key.offsets) {
                        continue;
                    }
                    let offset = base_address.checked_add(*child).ok_or_else(|| {
                        FormatError::Invalid(format!("chunk address {child} overflows"))
                    })?;
                    let location = ChunkLocation {
                        byte_range: ByteRange::new(offset, u64::from(key.chunk_size)),
                        filter_mask: key.filter_mask,
                    };
                    if locations.insert(key.offsets.clone(), location).is_some() {
                        return Err(FormatError::Invalid(format!(
                            "duplicate chunk offset {:?} in chunk index",
                            key.offsets
                        )));
                    }
                }
                Ok(vec![])
            },
        )
        .await?;
        Ok(locations)
    }

    /// Return the global heap collection at `address`, decoding it if it is not cached.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the collection is invalid or a fetch fails.
    pub async fn global_heap(&self, address: u64) -> Result<Arc<GlobalHeapCollection>, ReadError> {
        if let Some(collection) = self.nodes.global_heap(address) {
            return Ok(collection);
        }
        let sizes = self.sizes();
        let context =
            |err| ReadError::format(format!("global heap collection at address {address}"), err);
        let header = self
            .read_declared(
                "global heap collection",
                address,
                GlobalHeapCollection::header_size(sizes),
            )
            .await?;
        let size = GlobalHeapCollection::decode_size(&header, address, sizes).map_err(context)?;
        let data = self
            .read_declared("global heap collection", address, size)
            .await?;
        let collection =
            Arc::new(GlobalHeapCollection::decode(&data, address, sizes).map_err(context)?);
        self.nodes.insert_global_heap(address, collection.clone());
        Ok(collection)
    }
}
