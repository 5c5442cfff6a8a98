//! A minimal HDF5 writer for test fixtures.
//!
//! Files use a version 0 superblock with 8 byte offsets and lengths.
//! Groups are old-style (symbol table) groups with version 1 object headers, or new-style compact groups with a version 2 object header.
//! Datasets are compact, contiguous or chunked with a version 1 B-tree chunk index.
#![allow(dead_code)]

use std::{io::Write, sync::Arc, time::Duration};

use itertools::Itertools;

use cloud_asdf::{
    filter::fletcher32,
    format::{lookup3, HDF5_SIGNATURE},
    session::SessionOptions,
    storage::{store::AsyncMemoryStore, ObjectKey, PerformanceMetricsStorage},
    Session,
};

const UNDEFINED: u64 = u64::MAX;
const SUPERBLOCK_SIZE: usize = 96;

/// A datatype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dtype {
    Int {
        size: u32,
        signed: bool,
        big_endian: bool,
    },
    Float {
        size: u32,
        big_endian: bool,
    },
    FixedString(u32),
    VarString,
}

impl Dtype {
    pub const I8: Self = Self::int(1, true);
    pub const U8: Self = Self::int(1, false);
    pub const I16: Self = Self::int(2, true);
    pub const U16: Self = Self::int(2, false);
    pub const I32: Self = Self::int(4, true);
    pub const U32: Self = Self::int(4, false);
    pub const I64: Self = Self::int(8, true);
    pub const F32: Self = Self::Float {
        size: 4,
        big_endian: false,
    };
    pub const F64: Self = Self::Float {
        size: 8,
        big_endian: false,
    };

    const fn int(size: u32, signed: bool) -> Self {
        Self::Int {
            size,
            signed,
            big_endian: false,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Self::Int { size, .. } | Self::Float { size, .. } | Self::FixedString(size) => *size,
            Self::VarString => 16,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let header = |class: u8, bit_field: [u8; 3], size: u32| {
            let mut data = vec![0x10 | class];
            data.extend_from_slice(&bit_field);
            data.extend_from_slice(&size.to_le_bytes());
            data
        };
        match *self {
            Self::Int {
                size,
                signed,
                big_endian,
            } => {
                let bit_field = u8::from(big_endian) | if signed { 0b1000 } else { 0 };
                let mut data = header(0, [bit_field, 0, 0], size);
                data.extend_from_slice(&0u16.to_le_bytes());
                data.extend_from_slice(&(size as u16 * 8).to_le_bytes());
                data
            }
            Self::Float { size, big_endian } => {
                let bits = size * 8;
                let (exponent_size, mantissa_size, bias): (u8, u8, u32) = match size {
                    2 => (5, 10, 15),
                    4 => (8, 23, 127),
                    _ => (11, 52, 1023),
                };
                let bit_field = 0x20 | u8::from(big_endian);
                let mut data = header(1, [bit_field, (bits - 1) as u8, 0], size);
                data.extend_from_slice(&0u16.to_le_bytes());
                data.extend_from_slice(&(bits as u16).to_le_bytes());
                data.extend_from_slice(&[mantissa_size, exponent_size, 0, mantissa_size]);
                data.extend_from_slice(&bias.to_le_bytes());
                data
            }
            Self::FixedString(size) => header(3, [0, 0, 0], size),
            Self::VarString => {
                // variable-length string, null terminated, ASCII
                let mut data = header(9, [0x01, 0x00, 0], 16);
                data.extend(Self::U8.encode());
                data
            }
        }
    }
}

/// The values of a dataset or attribute.
#[derive(Clone, Debug)]
pub enum Values {
    /// Element bytes in the byte order of the datatype.
    Raw(Vec<u8>),
    /// String elements.
    Strings(Vec<String>),
    /// No storage is allocated.
    Unallocated,
}

/// A chunk filter applied when writing.
#[derive(Clone, Copy, Debug)]
pub enum Filter {
    Shuffle,
    Deflate,
    Fletcher32,
    /// A filter without an encoder, chunks are stored unchanged.
    Other(u16),
}

impl Filter {
    fn id(self) -> u16 {
        match self {
            Self::Deflate => 1,
            Self::Shuffle => 2,
            Self::Fletcher32 => 3,
            Self::Other(id) => id,
        }
    }

    fn client_data(self, element_size: u32) -> Vec<u32> {
        match self {
            Self::Deflate => vec![6],
            Self::Shuffle => vec![element_size],
            Self::Fletcher32 | Self::Other(_) => vec![],
        }
    }

    fn encode(self, data: Vec<u8>, element_size: usize) -> Vec<u8> {
        match self {
            Self::Shuffle => shuffle(&data, element_size),
            Self::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(6));
                encoder.write_all(&data).unwrap();
                encoder.finish().unwrap()
            }
            Self::Fletcher32 => {
                let checksum = fletcher32(&data);
                let mut data = data;
                data.extend_from_slice(&checksum.to_le_bytes());
                data
            }
            Self::Other(_) => data,
        }
    }
}

/// Byte shuffle `data` with elements of `element_size` bytes.
pub fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 {
        return data.to_vec();
    }
    let count = data.len() / element_size;
    let mut shuffled = vec![0; data.len()];
    for (i, element) in data.chunks_exact(element_size).enumerate() {
        for (byte_index, byte) in element.iter().enumerate() {
            shuffled[byte_index * count + i] = *byte;
        }
    }
    shuffled[count * element_size..].copy_from_slice(&data[count * element_size..]);
    shuffled
}

/// The storage layout of a dataset.
#[derive(Clone, Debug)]
pub enum Layout {
    Compact,
    Contiguous,
    Chunked {
        chunk: Vec<u64>,
        filters: Vec<Filter>,
        /// The maximum number of entries of a B-tree node.
        fanout: usize,
        /// Chunks that are not written.
        omit: Vec<Vec<u64>>,
        /// Chunks written with some filters skipped.
        masks: Vec<(Vec<u64>, u32)>,
    },
}

/// An attribute.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub dtype: Dtype,
    pub shape: Vec<u64>,
    pub values: Values,
}

impl Attribute {
    pub fn scalar<T: bytemuck::Pod>(name: &str, dtype: Dtype, value: T) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape: vec![],
            values: Values::Raw(bytemuck::bytes_of(&value).to_vec()),
        }
    }

    pub fn array<T: bytemuck::Pod>(name: &str, dtype: Dtype, values: &[T]) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape: vec![values.len() as u64],
            values: Values::Raw(bytemuck::cast_slice(values).to_vec()),
        }
    }

    pub fn string(name: &str, dtype: Dtype, value: &str) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape: vec![],
            values: Values::Strings(vec![value.to_string()]),
        }
    }

    pub fn strings(name: &str, dtype: Dtype, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape: vec![values.len() as u64],
            values: Values::Strings(values.iter().map(ToString::to_string).collect()),
        }
    }
}

/// A dataset.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub dtype: Dtype,
    pub shape: Vec<u64>,
    pub values: Values,
    pub layout: Layout,
    pub fill_value: Option<Vec<u8>>,
    pub attributes: Vec<Attribute>,
}

impl Dataset {
    /// A contiguous dataset of little-endian elements.
    pub fn new<T: bytemuck::Pod>(dtype: Dtype, shape: &[u64], values: &[T]) -> Self {
        Self::raw(dtype, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// A contiguous dataset of element bytes.
    pub fn raw(dtype: Dtype, shape: &[u64], bytes: Vec<u8>) -> Self {
        Self {
            dtype,
            shape: shape.to_vec(),
            values: Values::Raw(bytes),
            layout: Layout::Contiguous,
            fill_value: None,
            attributes: vec![],
        }
    }

    /// A contiguous dataset of strings.
    pub fn strings(dtype: Dtype, shape: &[u64], values: &[&str]) -> Self {
        Self {
            values: Values::Strings(values.iter().map(ToString::to_string).collect()),
            ..Self::raw(dtype, shape, vec![])
        }
    }

    /// A 1-D `int8` dataset holding the bytes of `text`.
    pub fn text(text: &str) -> Self {
        Self::raw(Dtype::I8, &[text.len() as u64], text.as_bytes().to_vec())
    }

    /// A dataset without allocated storage.
    pub fn unallocated(dtype: Dtype, shape: &[u64]) -> Self {
        Self {
            values: Values::Unallocated,
            ..Self::raw(dtype, shape, vec![])
        }
    }

    pub fn compact(mut self) -> Self {
        self.layout = Layout::Compact;
        self
    }

    pub fn chunked(mut self, chunk: &[u64]) -> Self {
        self.layout = Layout::Chunked {
            chunk: chunk.to_vec(),
            filters: vec![],
            fanout: 64,
            omit: vec![],
            masks: vec![],
        };
        self
    }

    #[allow(clippy::type_complexity)]
    fn chunked_mut(
        &mut self,
    ) -> (
        &mut Vec<Filter>,
        &mut usize,
        &mut Vec<Vec<u64>>,
        &mut Vec<(Vec<u64>, u32)>,
    ) {
        match &mut self.layout {
            Layout::Chunked {
                filters,
                fanout,
                omit,
                masks,
                ..
            } => (filters, fanout, omit, masks),
            _ => panic!("dataset is not chunked"),
        }
    }

    pub fn filters(mut self, new_filters: &[Filter]) -> Self {
        *self.chunked_mut().0 = new_filters.to_vec();
        self
    }

    pub fn fanout(mut self, new_fanout: usize) -> Self {
        *self.chunked_mut().1 = new_fanout;
        self
    }

    pub fn omit_chunk(mut self, offsets: &[u64]) -> Self {
        self.chunked_mut().2.push(offsets.to_vec());
        self
    }

    pub fn filter_mask(mut self, offsets: &[u64], mask: u32) -> Self {
        self.chunked_mut().3.push((offsets.to_vec(), mask));
        self
    }

    pub fn fill_value<T: bytemuck::Pod>(mut self, value: T) -> Self {
        self.fill_value = Some(bytemuck::bytes_of(&value).to_vec());
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// A group.
#[derive(Clone, Debug, Default)]
pub struct Group {
    pub children: Vec<(String, Node)>,
    pub attributes: Vec<Attribute>,
    /// Store links in a version 2 object header rather than a symbol table.
    pub compact: bool,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn child(mut self, name: &str, node: impl Into<Node>) -> Self {
        self.children.push((name.to_string(), node.into()));
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// A group or dataset.
#[derive(Clone, Debug)]
pub enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl From<Dataset> for Node {
    fn from(dataset: Dataset) -> Self {
        Self::Dataset(dataset)
    }
}

fn pad8(data: &mut Vec<u8>) {
    data.resize(data.len().next_multiple_of(8), 0);
}

fn dataspace(shape: &[u64]) -> Vec<u8> {
    let mut data = vec![1, shape.len() as u8, 0, 0, 0, 0, 0, 0];
    for dim in shape {
        data.extend_from_slice(&dim.to_le_bytes());
    }
    data
}

/// Return the C order multi-indices of `shape`.
fn indices(shape: &[u64]) -> Vec<Vec<u64>> {
    if shape.is_empty() {
        return vec![vec![]];
    }
    shape
        .iter()
        .map(|extent| 0..*extent)
        .multi_cartesian_product()
        .collect()
}

struct H5Writer {
    file: Vec<u8>,
    base: u64,
}

/// Serialise `root` as an HDF5 file.
pub fn write_hdf5(root: &Group) -> Vec<u8> {
    write_hdf5_with_userblock(root, 0)
}

/// Serialise `root` as an HDF5 file preceded by a user block of `userblock` bytes.
pub fn write_hdf5_with_userblock(root: &Group, userblock: usize) -> Vec<u8> {
    let mut writer = H5Writer {
        file: vec![0; userblock + SUPERBLOCK_SIZE],
        base: userblock as u64,
    };
    let (root_address, symbol_table) = writer.group(root);
    let eof = writer.position();

    let mut superblock = HDF5_SIGNATURE.to_vec();
    superblock.extend_from_slice(&[0, 0, 0, 0, 0, 8, 8, 0]);
    superblock.extend_from_slice(&4u16.to_le_bytes());
    superblock.extend_from_slice(&16u16.to_le_bytes());
    superblock.extend_from_slice(&0u32.to_le_bytes());
    for address in [userblock as u64, UNDEFINED, eof, UNDEFINED, 0, root_address] {
        superblock.extend_from_slice(&address.to_le_bytes());
    }
    match symbol_table {
        Some((btree, heap)) => {
            superblock.extend_from_slice(&1u32.to_le_bytes());
            superblock.extend_from_slice(&0u32.to_le_bytes());
            superblock.extend_from_slice(&btree.to_le_bytes());
            superblock.extend_from_slice(&heap.to_le_bytes());
        }
        None => superblock.extend_from_slice(&[0; 24]),
    }
    assert_eq!(superblock.len(), SUPERBLOCK_SIZE);
    writer.file[userblock..userblock + SUPERBLOCK_SIZE].copy_from_slice(&superblock);
    writer.file
}

impl H5Writer {
    fn position(&self) -> u64 {
        self.file.len() as u64 - self.base
    }

    /// Append `data` at the next 8 byte aligned address, returning the address.
    fn append(&mut self, data: &[u8]) -> u64 {
        let aligned = (self.file.len() - self.base as usize).next_multiple_of(8);
        self.file.resize(self.base as usize + aligned, 0);
        let address = self.position();
        self.file.extend_from_slice(data);
        address
    }

    fn node(&mut self, node: &Node) -> u64 {
        match node {
            Node::Group(group) => self.group(group).0,
            Node::Dataset(dataset) => self.dataset(dataset),
        }
    }

    /// Write a group, returning its object header address and symbol table (B-tree and heap addresses).
    fn group(&mut self, group: &Group) -> (u64, Option<(u64, u64)>) {
        let children = group
            .children
            .iter()
            .map(|(name, node)| (name.clone(), self.node(node)))
            .collect_vec();
        let mut messages: Vec<(u16, Vec<u8>)> = group
            .attributes
            .iter()
            .map(|attribute| (0x000C, self.attribute(attribute)))
            .collect();

        if group.compact {
            for (name, address) in &children {
                let mut link = vec![1, 0, name.len() as u8];
                link.extend_from_slice(name.as_bytes());
                link.extend_from_slice(&address.to_le_bytes());
                messages.push((0x0006, link));
            }
            return (self.object_header_v2(&messages), None);
        }

        // symbol table entries are ordered by name
        let children = children
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .collect_vec();
        let mut heap_data = vec![0; 8];
        let mut name_offsets = Vec::new();
        for (name, _) in &children {
            name_offsets.push(heap_data.len() as u64);
            heap_data.extend_from_slice(name.as_bytes());
            heap_data.push(0);
            pad8(&mut heap_data);
        }
        let heap_address = self.append(&[0; 32]);
        let data_address = self.append(&heap_data);
        let mut heap = b"HEAP\0\0\0\0".to_vec();
        heap.extend_from_slice(&(heap_data.len() as u64).to_le_bytes());
        heap.extend_from_slice(&UNDEFINED.to_le_bytes());
        heap.extend_from_slice(&data_address.to_le_bytes());
        let start = (self.base + heap_address) as usize;
        self.file[start..start + 32].copy_from_slice(&heap);

        let entries = children.iter().zip(&name_offsets).collect_vec();
        let mut symbol_nodes = Vec::new();
        for node_entries in entries.chunks(8) {
            let mut node = b"SNOD\x01\0".to_vec();
            node.extend_from_slice(&(node_entries.len() as u16).to_le_bytes());
            for ((_, address), name_offset) in node_entries {
                node.extend_from_slice(&name_offset.to_le_bytes());
                node.extend_from_slice(&address.to_le_bytes());
                node.extend_from_slice(&[0; 24]);
            }
            let last_name_offset = *node_entries[node_entries.len() - 1].1;
            symbol_nodes.push((self.append(&node), last_name_offset));
        }

        let mut btree = b"TREE\0\0".to_vec();
        btree.extend_from_slice(&(symbol_nodes.len() as u16).to_le_bytes());
        btree.extend_from_slice(&UNDEFINED.to_le_bytes());
        btree.extend_from_slice(&UNDEFINED.to_le_bytes());
        btree.extend_from_slice(&0u64.to_le_bytes());
        for (address, last_name_offset) in &symbol_nodes {
            btree.extend_from_slice(&address.to_le_bytes());
            btree.extend_from_slice(&last_name_offset.to_le_bytes());
        }
        let btree_address = self.append(&btree);

        let mut symbol_table = btree_address.to_le_bytes().to_vec();
        symbol_table.extend_from_slice(&heap_address.to_le_bytes());
        messages.push((0x0011, symbol_table));
        (
            self.object_header_v1(&messages),
            Some((btree_address, heap_address)),
        )
    }

    fn object_header_v1(&mut self, messages: &[(u16, Vec<u8>)]) -> u64 {
        let mut body = Vec::new();
        for (kind, data) in messages {
            let mut data = data.clone();
            pad8(&mut data);
            body.extend_from_slice(&kind.to_le_bytes());
            body.extend_from_slice(&(data.len() as u16).to_le_bytes());
            body.extend_from_slice(&[0; 4]);
            body.extend_from_slice(&data);
        }
        let mut header = vec![1, 0];
        header.extend_from_slice(&(messages.len() as u16).to_le_bytes());
        header.extend_from_slice(&1u32.to_le_bytes());
        header.extend_from_slice(&(body.len() as u32).to_le_bytes());
        header.extend_from_slice(&[0; 4]);
        header.extend_from_slice(&body);
        self.append(&header)
    }

    fn object_header_v2(&mut self, messages: &[(u16, Vec<u8>)]) -> u64 {
        let mut body = Vec::new();
        for (kind, data) in messages {
            body.push(*kind as u8);
            body.extend_from_slice(&(data.len() as u16).to_le_bytes());
            body.push(0);
            body.extend_from_slice(data);
        }
        let mut header = b"OHDR\x02\x02".to_vec();
        header.extend_from_slice(&(body.len() as u32).to_le_bytes());
        header.extend_from_slice(&body);
        let checksum = lookup3(&header);
        header.extend_from_slice(&checksum.to_le_bytes());
        self.append(&header)
    }

    /// Encode values as element bytes, writing a global heap collection for variable-length strings.
    fn elements(&mut self, dtype: Dtype, values: &Values) -> Option<Vec<u8>> {
        match (values, dtype) {
            (Values::Raw(bytes), _) => Some(bytes.clone()),
            (Values::Unallocated, _) => None,
            (Values::Strings(strings), Dtype::FixedString(size)) => Some(
                strings
                    .iter()
                    .flat_map(|string| {
                        let mut bytes = string.as_bytes().to_vec();
                        bytes.resize(size as usize, 0);
                        bytes
                    })
                    .collect(),
            ),
            (Values::Strings(strings), Dtype::VarString) => {
                let mut objects = Vec::new();
                for (index, string) in strings.iter().enumerate() {
                    objects.extend_from_slice(&(index as u16 + 1).to_le_bytes());
                    objects.extend_from_slice(&1u16.to_le_bytes());
                    objects.extend_from_slice(&[0; 4]);
                    objects.extend_from_slice(&(string.len() as u64).to_le_bytes());
                    objects.extend_from_slice(string.as_bytes());
                    pad8(&mut objects);
                }
                let mut collection = b"GCOL\x01\0\0\0".to_vec();
                collection.extend_from_slice(&(16 + objects.len() as u64).to_le_bytes());
                collection.extend_from_slice(&objects);
                let address = self.append(&collection);
                Some(
                    strings
                        .iter()
                        .enumerate()
                        .flat_map(|(index, string)| {
                            let mut reference = (string.len() as u32).to_le_bytes().to_vec();
                            if string.is_empty() {
                                reference.extend_from_slice(&[0; 12]);
                            } else {
                                reference.extend_from_slice(&address.to_le_bytes());
                                reference.extend_from_slice(&(index as u32 + 1).to_le_bytes());
                            }
                            reference
                        })
                        .collect(),
                )
            }
            (Values::Strings(_), dtype) => panic!("strings cannot be stored as {dtype:?}"),
        }
    }

    fn attribute(&mut self, attribute: &Attribute) -> Vec<u8> {
        let data = self
            .elements(attribute.dtype, &attribute.values)
            .unwrap_or_default();
        let mut name = attribute.name.as_bytes().to_vec();
        name.push(0);
        let datatype = attribute.dtype.encode();
        let dataspace = dataspace(&attribute.shape);
        let mut message = vec![1, 0];
        for size in [name.len(), datatype.len(), dataspace.len()] {
            message.extend_from_slice(&(size as u16).to_le_bytes());
        }
        for mut part in [name, datatype, dataspace] {
            pad8(&mut part);
            message.extend_from_slice(&part);
        }
        message.extend_from_slice(&data);
        message
    }

    fn dataset(&mut self, dataset: &Dataset) -> u64 {
        let element_size = dataset.dtype.size();
        let data = self.elements(dataset.dtype, &dataset.values);
        let mut messages = vec![
            (0x0001, dataspace(&dataset.shape)),
            (0x0003, dataset.dtype.encode()),
        ];
        if let Some(fill_value) = &dataset.fill_value {
            let mut message = vec![2, 2, 2, 1];
            message.extend_from_slice(&(fill_value.len() as u32).to_le_bytes());
            message.extend_from_slice(fill_value);
            messages.push((0x0005, message));
        }

        let layout = match &dataset.layout {
            Layout::Compact => {
                let data = data.unwrap_or_default();
                let mut layout = vec![3, 0];
                layout.extend_from_slice(&(data.len() as u16).to_le_bytes());
                layout.extend_from_slice(&data);
                layout
            }
            Layout::Contiguous => {
                let size = dataset.shape.iter().product::<u64>() * u64::from(element_size);
                let address = data.map_or(UNDEFINED, |data| self.append(&data));
                let mut layout = vec![3, 1];
                layout.extend_from_slice(&address.to_le_bytes());
                layout.extend_from_slice(&size.to_le_bytes());
                layout
            }
            Layout::Chunked { chunk, filters, .. } => {
                if !filters.is_empty() {
                    let mut pipeline = vec![1, filters.len() as u8, 0, 0, 0, 0, 0, 0];
                    for filter in filters {
                        let client_data = filter.client_data(element_size);
                        pipeline.extend_from_slice(&filter.id().to_le_bytes());
                        pipeline.extend_from_slice(&0u16.to_le_bytes());
                        pipeline.extend_from_slice(&0u16.to_le_bytes());
                        pipeline.extend_from_slice(&(client_data.len() as u16).to_le_bytes());
                        for value in &client_data {
                            pipeline.extend_from_slice(&value.to_le_bytes());
                        }
                        if client_data.len() % 2 == 1 {
                            pipeline.extend_from_slice(&[0; 4]);
                        }
                    }
                    messages.push((0x000B, pipeline));
                }
                let address = data.map_or(UNDEFINED, |data| self.chunks(dataset, &data));
                let mut layout = vec![3, 2, chunk.len() as u8 + 1];
                layout.extend_from_slice(&address.to_le_bytes());
                for dim in chunk {
                    layout.extend_from_slice(&(*dim as u32).to_le_bytes());
                }
                layout.extend_from_slice(&element_size.to_le_bytes());
                layout
            }
        };
        messages.push((0x0008, layout));
        for attribute in &dataset.attributes {
            let message = self.attribute(attribute);
            messages.push((0x000C, message));
        }
        self.object_header_v1(&messages)
    }

    /// Write the chunks of a dataset and their B-tree, returning the B-tree root address.
    fn chunks(&mut self, dataset: &Dataset, data: &[u8]) -> u64 {
        let Layout::Chunked {
            chunk,
            filters,
            fanout,
            omit,
            masks,
        } = &dataset.layout
        else {
            unreachable!()
        };
        let element_size = dataset.dtype.size() as usize;
        let shape = &dataset.shape;
        let fill = dataset
            .fill_value
            .clone()
            .unwrap_or_else(|| vec![0; element_size]);
        let strides = (0..shape.len())
            .map(|dim| shape[dim + 1..].iter().product::<u64>())
            .collect_vec();
        let grid = std::iter::zip(shape, chunk)
            .map(|(extent, chunk)| extent.div_ceil(*chunk))
            .collect_vec();

        let mut entries = Vec::new();
        for chunk_indices in indices(&grid) {
            let offsets = std::iter::zip(&chunk_indices, chunk)
                .map(|(index, chunk)| index * chunk)
                .collect_vec();
            if omit.contains(&offsets) {
                continue;
            }
            let mut raw = Vec::new();
            for local in indices(chunk) {
                let global = std::iter::zip(&offsets, &local)
                    .map(|(offset, local)| offset + local)
                    .collect_vec();
                if std::iter::zip(&global, shape).all(|(index, extent)| index < extent) {
                    let linear = std::iter::zip(&global, &strides)
                        .map(|(index, stride)| index * stride)
                        .sum::<u64>() as usize;
                    raw.extend_from_slice(
                        &data[linear * element_size..(linear + 1) * element_size],
                    );
                } else {
                    raw.extend_from_slice(&fill);
                }
            }
            let mask = masks
                .iter()
                .find(|(masked, _)| *masked == offsets)
                .map_or(0, |(_, mask)| *mask);
            let encoded = filters
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) == 0)
                .fold(raw, |bytes, (_, filter)| filter.encode(bytes, element_size));
            let address = self.append(&encoded);
            entries.push((offsets, encoded.len() as u32, mask, address));
        }
        self.chunk_btree(&entries, shape.len(), *fanout)
    }

    fn chunk_btree(
        &mut self,
        entries: &[(Vec<u64>, u32, u32, u64)],
        rank: usize,
        fanout: usize,
    ) -> u64 {
        let key = |offsets: &[u64], size: u32, mask: u32| {
            let mut key = size.to_le_bytes().to_vec();
            key.extend_from_slice(&mask.to_le_bytes());
            for offset in offsets.iter().chain([&0]) {
                key.extend_from_slice(&offset.to_le_bytes());
            }
            key
        };
        let node = |level: u8, children: &[(Vec<u8>, u64)], final_key: Vec<u8>| {
            let mut node = b"TREE\x01".to_vec();
            node.push(level);
            node.extend_from_slice(&(children.len() as u16).to_le_bytes());
            node.extend_from_slice(&UNDEFINED.to_le_bytes());
            node.extend_from_slice(&UNDEFINED.to_le_bytes());
            for (key, address) in children {
                node.extend_from_slice(key);
                node.extend_from_slice(&address.to_le_bytes());
            }
            node.extend_from_slice(&final_key);
            node
        };

        if entries.is_empty() {
            return self.append(&node(0, &[], key(&vec![0; rank], 0, 0)));
        }

        // (first offsets, last offsets, address) of the nodes of the current level
        let mut level_nodes = Vec::new();
        for leaf in entries.chunks(fanout) {
            let children = leaf
                .iter()
                .map(|(offsets, size, mask, address)| (key(offsets, *size, *mask), *address))
                .collect_vec();
            let last = &leaf[leaf.len() - 1].0;
            let address = self.append(&node(0, &children, key(last, 0, 0)));
            level_nodes.push((leaf[0].0.clone(), last.clone(), address));
        }
        let mut level = 0;
        while level_nodes.len() > 1 {
            level += 1;
            let mut next = Vec::new();
            for group in level_nodes.chunks(fanout) {
                let children = group
                    .iter()
                    .map(|(first, _, address)| (key(first, 0, 0), *address))
                    .collect_vec();
                let last = &group[group.len() - 1].1;
                let address = self.append(&node(level, &children, key(last, 0, 0)));
                next.push((group[0].0.clone(), last.clone(), address));
            }
            level_nodes = next;
        }
        level_nodes[0].2
    }
}

/// The values `0..n` of a `(rows, columns)` int32 dataset, `value = row * columns + column`.
pub fn int32_grid(rows: u64, columns: u64) -> Vec<i32> {
    (0..(rows * columns) as i32).collect()
}

/// A file covering each storage layout and filter.
pub fn layouts_file() -> Vec<u8> {
    let grid = int32_grid(100, 10);
    let root = Group::new()
        .attribute(Attribute::string("title", Dtype::FixedString(16), "layouts"))
        .attribute(Attribute::array("version", Dtype::I32, &[1i32, 2]))
        .child(
            "chunked",
            Dataset::new(Dtype::I32, &[100, 10], &grid).chunked(&[10, 10]),
        )
        .child(
            "filtered",
            Dataset::new(Dtype::I32, &[100, 10], &grid)
                .chunked(&[10, 10])
                .filters(&[Filter::Shuffle, Filter::Deflate, Filter::Fletcher32])
                .fanout(4),
        )
        .child(
            "edge",
            Dataset::new(Dtype::I32, &[25, 7], &int32_grid(25, 7))
                .chunked(&[10, 4])
                .filters(&[Filter::Deflate]),
        )
        .child(
            "sparse",
            Dataset::new(Dtype::I32, &[20, 10], &int32_grid(20, 10))
                .chunked(&[10, 10])
                .fill_value(-1i32)
                .omit_chunk(&[10, 0]),
        )
        .child(
            "masked",
            Dataset::new(Dtype::U16, &[64], &(0u16..64).collect_vec())
                .chunked(&[16])
                .filters(&[Filter::Shuffle, Filter::Deflate])
                .filter_mask(&[16], 0b01),
        )
        .child(
            "lzf",
            Dataset::new(Dtype::I32, &[100, 10], &grid)
                .chunked(&[10, 10])
                .filters(&[Filter::Other(32000)]),
        )
        .child(
            "contiguous",
            Dataset::new(Dtype::F64, &[50], &(0..50).map(f64::from).collect_vec()),
        )
        .child(
            "compact",
            Dataset::new(Dtype::U8, &[2, 3], &[1u8, 2, 3, 4, 5, 6]).compact(),
        )
        .child(
            "big_endian",
            Dataset::raw(
                Dtype::Int {
                    size: 4,
                    signed: true,
                    big_endian: true,
                },
                &[3],
                [1i32, -2, 300_000]
                    .iter()
                    .flat_map(|value| value.to_be_bytes())
                    .collect(),
            ),
        )
        .child(
            "scalar",
            Dataset::new(Dtype::F32, &[], &[2.5f32]),
        )
        .child("empty", Dataset::new::<i32>(Dtype::I32, &[0, 4], &[]))
        .child("unallocated", Dataset::unallocated(Dtype::I16, &[4]).fill_value(7i16))
        .child(
            "names",
            Dataset::strings(Dtype::VarString, &[3], &["alpha", "", "gamma"]),
        )
        .child(
            "codes",
            Dataset::strings(Dtype::FixedString(4), &[2], &["ab", "wxyz"]),
        )
        .child(
            "nested",
            Group::new().child(
                "inner",
                Group::new()
                    .attribute(Attribute::scalar("depth", Dtype::I64, 2i64))
                    .child("leaf", Dataset::new(Dtype::I8, &[3], &[-1i8, 0, 1])),
            ),
        )
        .child(
            "links",
            Group::new()
                .compact()
                .attribute(Attribute::string("kind", Dtype::VarString, "compact"))
                .child("x", Dataset::new(Dtype::U32, &[2], &[10u32, 20])),
        )
        .child(
            "wide",
            (0..20).fold(Group::new(), |group, i| {
                group.child(
                    &format!("member_{i:02}"),
                    Dataset::new(Dtype::I32, &[1], &[i]),
                )
            }),
        );
    write_hdf5(&root)
}

/// The start of each waveform in [`asdf_file`].
pub const STARTTIME: &str = "2019-07-01T00:00:00";
/// The end of each waveform in [`asdf_file`].
pub const ENDTIME: &str = "2019-07-01T00:00:10";
/// Stored xarray attributes of [`asdf_file`], written with numpy values.
pub const XARRAY_ATTRIBUTES: &str = "{'scale': array([1.0, 2.5], dtype=float32), 'offset': np.float64(0.5), 'shape': (3, 4), 'units': 'm/s', 'flags': array([True, False], dtype=bool_)}";
/// The QuakeML document of [`asdf_file`].
pub const QUAKEML: &str = "<?xml version='1.0' encoding='utf-8'?>\n<q:quakeml xmlns:q=\"http://quakeml.org/xmlns/quakeml/1.2\"><eventParameters publicID=\"smi:local/catalog\"/></q:quakeml>";

/// Return the StationXML document of a station in [`asdf_file`].
pub fn stationxml(station: &str) -> String {
    format!("<?xml version='1.0' encoding='UTF-8'?>\n<FDSNStationXML schemaVersion=\"1.1\"><Network code=\"UW\"><Station code=\"{station}\"/></Network></FDSNStationXML>")
}

/// Return the name of a waveform dataset in [`asdf_file`].
pub fn waveform_name(id: &str, tag: &str) -> String {
    format!("{id}__{STARTTIME}__{ENDTIME}__{tag}")
}

/// The samples of a waveform in [`asdf_file`].
pub fn waveform_samples(seed: usize) -> Vec<f32> {
    (0..1001)
        .map(|i| ((i + seed) as f32 * 0.01).sin())
        .collect()
}

/// An ASDF file with two stations.
pub fn asdf_file() -> Vec<u8> {
    let waveform = |seed: usize| {
        Dataset::new(Dtype::F32, &[1001], &waveform_samples(seed))
            .chunked(&[256])
            .filters(&[Filter::Shuffle, Filter::Deflate])
            .attribute(Attribute::scalar(
                "starttime",
                Dtype::I64,
                1_561_939_200_000_000_000i64,
            ))
            .attribute(Attribute::scalar("sampling_rate", Dtype::F64, 100.0f64))
    };
    let osd = Group::new()
        .child(
            "StationXML",
            Dataset::text(&format!("{}\n\0\0", stationxml("OSD"))),
        )
        .child(&waveform_name("UW.OSD..EHZ", "raw_recording"), waveform(0))
        .child(&waveform_name("UW.OSD..EHN", "raw_recording"), waveform(1))
        .child(
            &waveform_name("UW.OSD..EHE", "processed"),
            Dataset::new(Dtype::I32, &[11], &(0..11).collect_vec()),
        );
    let shw = Group::new()
        .child("StationXML", Dataset::text(&stationxml("SHW")))
        .child(&waveform_name("UW.SHW..EHZ", "raw_recording"), waveform(2));
    let asdf_dict = format!(
        "{{'Waveforms': {{'UW.OSD': {{'StationXML': None, '{}': None}}, 'UW.SHW': {{'StationXML': None}}}}, 'QuakeML': None, 'count': 3, 'gain': float32(1.5)}}",
        waveform_name("UW.OSD..EHZ", "raw_recording")
    );
    let root = Group::new()
        .attribute(Attribute::string("file_format", Dtype::FixedString(4), "ASDF"))
        .attribute(Attribute::string(
            "file_format_version",
            Dtype::VarString,
            "1.0.3",
        ))
        .child(
            "AuxiliaryData",
            Group::new()
                .child("ASDFDict", Dataset::text(&asdf_dict))
                .child("Attributes", Dataset::text(XARRAY_ATTRIBUTES))
                .child("Broken", Dataset::text("{'a': ")),
        )
        .child("Provenance", Group::new())
        .child("QuakeML", Dataset::text(&format!("  {QUAKEML}\n")))
        .child("Waveforms", Group::new().child("UW.OSD", osd).child("UW.SHW", shw));
    write_hdf5(&root)
}

/// An in-memory object with read counting.
pub struct TestObject {
    pub storage: Arc<PerformanceMetricsStorage<AsyncMemoryStore>>,
    pub key: ObjectKey,
}

impl TestObject {
    pub fn new(data: Vec<u8>) -> Self {
        let store = AsyncMemoryStore::new();
        let key = ObjectKey::new("data/file.h5").unwrap();
        store.set(&key, data);
        Self {
            storage: Arc::new(PerformanceMetricsStorage::new(Arc::new(store))),
            key,
        }
    }

    pub async fn open(&self) -> Session {
        self.open_with(options()).await
    }

    pub async fn open_with(&self, options: SessionOptions) -> Session {
        Session::open(self.storage.clone(), self.key.clone(), options)
            .await
            .unwrap()
    }
}

/// Session options for tests.
pub fn options() -> SessionOptions {
    SessionOptions::builder()
        .fetch_timeout(Duration::from_secs(10))
        .build()
}
