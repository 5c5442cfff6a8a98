//! Structural nodes.
//!
//! A [`StructuralNode`] is the decoded, immutable form of one piece of an HDF5 container's metadata graph: the [`Superblock`], a [`GroupNode`], a [`DatasetNode`] or an [`AttributeNode`].
//! Each node records the byte range of the object header it was decoded from.
//!
//! Nodes are decoded lazily by the [`FormatParser`](crate::format::FormatParser) and shared through [`Arc`]s once published to the [`NodeCache`](crate::chunk_cache::NodeCache).

mod node_path;

use std::sync::Arc;

use bytes::Bytes;

pub use node_path::{NodePath, NodePathError};

use crate::{
    byte_range::ByteRange,
    format::{
        AttributeMessage, DataLayout, DataspaceKind, Datatype, FillValue, FilterDescription,
        FormatError, HeaderMessage, LinkTarget, Superblock,
    },
};

/// A decoded structural node.
#[derive(Debug, Clone)]
pub enum StructuralNode {
    /// The superblock.
    Superblock(Arc<Superblock>),
    /// A group.
    Group(Arc<GroupNode>),
    /// A dataset.
    Dataset(Arc<DatasetNode>),
    /// An attribute.
    Attribute(Arc<AttributeNode>),
}

impl StructuralNode {
    /// Return the node kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Superblock(_) => "superblock",
            Self::Group(_) => "group",
            Self::Dataset(_) => "dataset",
            Self::Attribute(_) => "attribute",
        }
    }

    /// Return the attributes of a group or dataset node.
    #[must_use]
    pub fn attributes(&self) -> &[Arc<AttributeNode>] {
        match self {
            Self::Group(group) => &group.attributes,
            Self::Dataset(dataset) => &dataset.attributes,
            Self::Superblock(_) | Self::Attribute(_) => &[],
        }
    }
}

/// A named child of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChild {
    /// The link name.
    pub name: String,
    /// The link target.
    pub target: LinkTarget,
}

/// A decoded group.
#[derive(Debug, Clone)]
pub struct GroupNode {
    /// The byte range of the group object header.
    pub byte_range: ByteRange,
    /// The children in storage order, without duplicate names.
    pub children: Vec<GroupChild>,
    /// The attributes.
    pub attributes: Vec<Arc<AttributeNode>>,
}

impl GroupNode {
    /// Create a group node, removing children with a duplicate name (the first occurrence wins).
    #[must_use]
    pub fn new(
        byte_range: ByteRange,
        children: Vec<GroupChild>,
        attributes: Vec<Arc<AttributeNode>>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let children = children
            .into_iter()
            .filter(|child| {
                let first = seen.insert(child.name.clone());
                if !first {
                    tracing::debug!(name = %child.name, "ignoring duplicate link name");
                }
                first
            })
            .collect();
        Self {
            byte_range,
            children,
            attributes,
        }
    }

    /// Return the child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&GroupChild> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Return the child names in storage order.
    #[must_use]
    pub fn child_names(&self) -> Vec<String> {
        self.children.iter().map(|child| child.name.clone()).collect()
    }
}

/// A decoded dataset.
#[derive(Debug, Clone)]
pub struct DatasetNode {
    /// The byte range of the dataset object header.
    pub byte_range: ByteRange,
    /// The dataspace kind.
    pub dataspace_kind: DataspaceKind,
    /// The dataset shape.
    pub shape: Vec<u64>,
    /// The element datatype.
    pub datatype: Datatype,
    /// The fill value.
    pub fill_value: FillValue,
    /// The data layout.
    pub layout: DataLayout,
    /// The chunk shape of a chunked dataset, with one element per dataset dimension.
    pub chunk_shape: Option<Vec<u64>>,
    /// The filter pipeline, in the order filters were applied when writing.
    pub filters: Vec<FilterDescription>,
    /// The attributes.
    pub attributes: Vec<Arc<AttributeNode>>,
}

impl DatasetNode {
    /// Return the element size in bytes.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.datatype.size()
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        match self.dataspace_kind {
            DataspaceKind::Null => 0,
            DataspaceKind::Scalar | DataspaceKind::Simple => self.shape.iter().product(),
        }
    }

    /// Create a dataset node from the header messages of an object header spanning `byte_range`.
    ///
    /// The first dataspace, datatype, layout, filter pipeline and fill value messages are used.
    /// A new-style fill value message takes precedence over an old-style one.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if a required message is missing, the dataset byte size overflows or the chunk shape does not match the dataset rank.
    pub fn from_messages(
        byte_range: ByteRange,
        messages: Vec<HeaderMessage>,
    ) -> Result<Self, FormatError> {
        let mut dataspace = None;
        let mut datatype = None;
        let mut layout = None;
        let mut filters = None;
        let mut fill_value = None;
        let mut fill_value_old = None;
        let mut attributes = Vec::new();
        for message in messages {
            match message {
                HeaderMessage::Dataspace(message) => {
                    dataspace.get_or_insert(message);
                }
                HeaderMessage::Datatype(message) => {
                    datatype.get_or_insert(message);
                }
                HeaderMessage::DataLayout(message) => {
                    layout.get_or_insert(message);
                }
                HeaderMessage::FilterPipeline(message) => {
                    filters.get_or_insert(message);
                }
                HeaderMessage::FillValue(message) => {
                    fill_value.get_or_insert(message);
                }
                HeaderMessage::FillValueOld(message) => {
                    fill_value_old.get_or_insert(message);
                }
                HeaderMessage::Attribute(message) => {
                    attributes.push(Arc::new(AttributeNode::from(message)));
                }
                _ => {}
            }
        }
        let missing = |message: &str| {
            FormatError::Invalid(format!("dataset object header has no {message} message"))
        };
        let dataspace = dataspace.ok_or_else(|| missing("dataspace"))?;
        let datatype = datatype.ok_or_else(|| missing("datatype"))?;
        let layout = layout.ok_or_else(|| missing("data layout"))?;

        // num_elements and the byte sizes derived from it rely on these products fitting
        let num_elements = dataspace
            .shape
            .iter()
            .try_fold(1u64, |acc, dim| acc.checked_mul(*dim));
        if num_elements
            .and_then(|n| n.checked_mul(datatype.size() as u64))
            .is_none()
        {
            return Err(FormatError::Invalid(format!(
                "dataspace {:?} of {}-byte elements overflows",
                dataspace.shape,
                datatype.size()
            )));
        }

        let chunk_shape = match &layout {
            DataLayout::Chunked { chunk_dims, .. } => {
                let rank = dataspace.shape.len();
                let chunk_shape = if chunk_dims.len() == rank + 1 {
                    chunk_dims[..rank].to_vec()
                } else if chunk_dims.len() == rank {
                    chunk_dims.clone()
                } else {
                    return Err(FormatError::Invalid(format!(
                        "chunk dimensionality {} does not match dataset rank {rank}",
                        chunk_dims.len()
                    )));
                };
                if chunk_shape.contains(&0) {
                    return Err(FormatError::Invalid(format!(
                        "invalid chunk shape {chunk_shape:?}"
                    )));
                }
                Some(chunk_shape)
            }
            DataLayout::Compact { .. } | DataLayout::Contiguous { .. } => None,
        };

        Ok(Self {
            byte_range,
            dataspace_kind: dataspace.kind,
            shape: dataspace.shape,
            datatype,
            fill_value: fill_value.or(fill_value_old).unwrap_or_default(),
            layout,
            chunk_shape,
            filters: filters.unwrap_or_default(),
            attributes,
        })
    }
}

/// A decoded attribute.
#[derive(Debug, Clone)]
pub struct AttributeNode {
    /// The attribute name.
    pub name: String,
    /// The element datatype.
    pub datatype: Datatype,
    /// The attribute shape.
    pub shape: Vec<u64>,
    /// The raw element bytes.
    pub data: Bytes,
}

impl From<AttributeMessage> for AttributeNode {
    fn from(message: AttributeMessage) -> Self {
        Self {
            name: message.name,
            datatype: message.datatype,
            shape: message.dataspace.shape,
            data: message.data,
        }
    }
}

/// Returns true if header messages describe a dataset rather than a group.
#[must_use]
pub fn is_dataset(messages: &[HeaderMessage]) -> bool {
    messages
        .iter()
        .any(|message| matches!(message, HeaderMessage::DataLayout(_)))
}
