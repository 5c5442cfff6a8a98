//! Slice requests and their intersection with a chunk grid.
//!
//! A [`SliceRequest`] selects `start..stop` with a `step` in every dimension of a dataset.
//! [`SliceRequest::chunk_selections`] computes the chunks of a regular chunk grid that hold at least one selected element, and for each of them the elements to crop from the decoded chunk and where they land in the output.

use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

use crate::error::OutOfRangeCause;

/// A strided selection `start..stop` with `step` in one dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("{start}:{stop}:{step}")]
pub struct DimSlice {
    start: u64,
    stop: u64,
    step: u64,
}

/// An invalid slice error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidSliceError {
    /// The step is zero.
    #[error("slice {0}:{1}:0 has a zero step")]
    ZeroStep(u64, u64),
    /// The slice is empty.
    #[error("slice {0}:{1} is empty")]
    Empty(u64, u64),
}

impl DimSlice {
    /// Create a new dimension slice.
    ///
    /// # Errors
    /// Returns [`InvalidSliceError`] if `step` is zero or `start` is not less than `stop`.
    pub fn new(start: u64, stop: u64, step: u64) -> Result<Self, InvalidSliceError> {
        if step == 0 {
            Err(InvalidSliceError::ZeroStep(start, stop))
        } else if start >= stop {
            Err(InvalidSliceError::Empty(start, stop))
        } else {
            Ok(Self { start, stop, step })
        }
    }

    /// Select every element of a dimension of length `extent`.
    #[must_use]
    pub fn full(extent: u64) -> Self {
        Self {
            start: 0,
            stop: extent,
            step: 1,
        }
    }

    /// Return the start.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Return the exclusive stop.
    #[must_use]
    pub fn stop(&self) -> u64 {
        self.stop
    }

    /// Return the step.
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Return the number of selected elements.
    #[must_use]
    pub fn len(&self) -> u64 {
        (self.stop - self.start).div_ceil(self.step)
    }

    /// Returns true if no elements are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the index of the last selected element.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.start + self.len().saturating_sub(1) * self.step
    }

    /// Return the chunk-wise decomposition of the selection for chunks of length `chunk`.
    ///
    /// Chunks without a selected element are skipped.
    #[must_use]
    pub fn chunk_runs(&self, chunk: u64) -> Vec<DimChunkRun> {
        if self.is_empty() || chunk == 0 {
            return vec![];
        }
        let count = self.len();
        (self.start / chunk..=self.last() / chunk)
            .filter_map(|chunk_index| {
                let chunk_start = chunk_index * chunk;
                let first = chunk_start.max(self.start);
                let begin = (first - self.start).div_ceil(self.step);
                let end = (chunk_start + chunk)
                    .saturating_sub(self.start)
                    .div_ceil(self.step)
                    .min(count);
                (begin < end).then(|| DimChunkRun {
                    chunk_index,
                    start: self.start + begin * self.step - chunk_start,
                    step: self.step,
                    count: end - begin,
                    output_start: begin,
                })
            })
            .collect()
    }
}

/// The selected elements of one chunk in one dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DimChunkRun {
    /// The index of the chunk in the chunk grid.
    pub chunk_index: u64,
    /// The first selected element, relative to the chunk start.
    pub start: u64,
    /// The step between selected elements.
    pub step: u64,
    /// The number of selected elements.
    pub count: u64,
    /// The position of the first selected element in the output.
    pub output_start: u64,
}

/// The selected elements of one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSelection {
    /// The per-dimension selections.
    pub runs: Vec<DimChunkRun>,
}

impl ChunkSelection {
    /// Return the chunk grid indices.
    #[must_use]
    pub fn chunk_indices(&self) -> Vec<u64> {
        self.runs.iter().map(|run| run.chunk_index).collect()
    }

    /// Return the element offset of the chunk origin.
    #[must_use]
    pub fn chunk_offset(&self, chunk_shape: &[u64]) -> Vec<u64> {
        std::iter::zip(&self.runs, chunk_shape)
            .map(|(run, chunk)| run.chunk_index * chunk)
            .collect()
    }

    /// Return the number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.runs.iter().map(|run| run.count).product()
    }

    /// Copy the selected elements from a decoded chunk into `output`.
    ///
    /// `chunk` holds the row-major chunk elements starting at element `chunk_element_offset` (non-zero when only part of the chunk was fetched).
    /// `output` is a row-major array of `output_shape`.
    ///
    /// # Errors
    /// Returns [`SelectionCopyError`] if `chunk` or `output` are too short for the selection.
    pub fn copy(
        &self,
        chunk: &[u8],
        chunk_shape: &[u64],
        chunk_element_offset: u64,
        element_size: usize,
        output: &mut [u8],
        output_shape: &[u64],
    ) -> Result<(), SelectionCopyError> {
        let rank = self.runs.len();
        if rank == 0 {
            let source = chunk
                .get(..element_size)
                .ok_or(SelectionCopyError::Source(element_size, chunk.len()))?;
            let target_len = output.len();
            output
                .get_mut(..element_size)
                .ok_or(SelectionCopyError::Output(element_size, target_len))?
                .copy_from_slice(source);
            return Ok(());
        }
        let chunk_strides = strides(chunk_shape);
        let output_strides = strides(output_shape);
        let inner = self.runs[rank - 1];
        let contiguous = inner.step == 1;

        let outer = &self.runs[..rank - 1];
        let positions = outer
            .iter()
            .map(|run| 0..run.count)
            .multi_cartesian_product();
        // a rank 1 selection has a single empty outer position
        let positions: Box<dyn Iterator<Item = Vec<u64>>> = if outer.is_empty() {
            Box::new(std::iter::once(vec![]))
        } else {
            Box::new(positions)
        };

        for position in positions {
            let mut source_element = inner.start;
            let mut output_element = inner.output_start;
            for (dimension, (k, run)) in std::iter::zip(&position, outer).enumerate() {
                source_element += (run.start + k * run.step) * chunk_strides[dimension];
                output_element += (run.output_start + k) * output_strides[dimension];
            }
            let source_element = source_element
                .checked_sub(chunk_element_offset)
                .ok_or(SelectionCopyError::Source(0, chunk.len()))?;
            if contiguous {
                let length = to_usize(inner.count) * element_size;
                let source_start = to_usize(source_element) * element_size;
                let output_start = to_usize(output_element) * element_size;
                let source = chunk
                    .get(source_start..source_start + length)
                    .ok_or(SelectionCopyError::Source(source_start + length, chunk.len()))?;
                let output_len = output.len();
                output
                    .get_mut(output_start..output_start + length)
                    .ok_or(SelectionCopyError::Output(output_start + length, output_len))?
                    .copy_from_slice(source);
            } else {
                for k in 0..inner.count {
                    let source_start = to_usize(source_element + k * inner.step) * element_size;
                    let output_start = to_usize(output_element + k) * element_size;
                    let source = chunk
                        .get(source_start..source_start + element_size)
                        .ok_or(SelectionCopyError::Source(
                            source_start + element_size,
                            chunk.len(),
                        ))?;
                    let output_len = output.len();
                    output
                        .get_mut(output_start..output_start + element_size)
                        .ok_or(SelectionCopyError::Output(
                            output_start + element_size,
                            output_len,
                        ))?
                        .copy_from_slice(source);
                }
            }
        }
        Ok(())
    }
}

/// A selection copy error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionCopyError {
    /// The source bytes are too short.
    #[error("selection needs {0} source bytes, got {1}")]
    Source(usize, usize),
    /// The output bytes are too short.
    #[error("selection needs {0} output bytes, got {1}")]
    Output(usize, usize),
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Return the row-major element strides of `shape`.
#[must_use]
pub fn strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// A multi-dimensional strided slice of a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("[{}]", _0.iter().join(", "))]
pub struct SliceRequest(Vec<DimSlice>);

impl SliceRequest {
    /// Create a slice request from `(start, stop, step)` tuples.
    ///
    /// # Errors
    /// Returns [`InvalidSliceError`] if a step is zero or a slice is empty.
    pub fn new(slices: Vec<(u64, u64, u64)>) -> Result<Self, InvalidSliceError> {
        slices
            .into_iter()
            .map(|(start, stop, step)| DimSlice::new(start, stop, step))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Create a slice request from dimension slices.
    #[must_use]
    pub fn from_slices(slices: Vec<DimSlice>) -> Self {
        Self(slices)
    }

    /// Select every element of an array of `shape`.
    #[must_use]
    pub fn full(shape: &[u64]) -> Self {
        Self(shape.iter().map(|extent| DimSlice::full(*extent)).collect())
    }

    /// Return the dimension slices.
    #[must_use]
    pub fn slices(&self) -> &[DimSlice] {
        &self.0
    }

    /// Return the number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Return the shape of the selection after step subsampling.
    #[must_use]
    pub fn shape(&self) -> Vec<u64> {
        self.0.iter().map(DimSlice::len).collect()
    }

    /// Return the number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.0.iter().map(DimSlice::len).product()
    }

    /// Validate the slice request against an array of `shape`.
    ///
    /// # Errors
    /// Returns [`OutOfRangeCause::SliceRank`] if the ranks differ, or [`OutOfRangeCause::Slice`] if a slice exceeds its dimension.
    pub fn validate(&self, shape: &[u64]) -> Result<(), OutOfRangeCause> {
        if self.rank() != shape.len() {
            return Err(OutOfRangeCause::SliceRank {
                rank: shape.len(),
                slice_rank: self.rank(),
            });
        }
        for (dimension, (slice, extent)) in std::iter::zip(&self.0, shape).enumerate() {
            if slice.stop > *extent || slice.start >= slice.stop || slice.step == 0 {
                return Err(OutOfRangeCause::Slice {
                    dimension,
                    start: slice.start,
                    stop: slice.stop,
                    step: slice.step,
                    extent: *extent,
                });
            }
        }
        Ok(())
    }

    /// Return the selections of every chunk of a regular grid of `chunk_shape` holding a selected element, in row-major chunk order.
    #[must_use]
    pub fn chunk_selections(&self, chunk_shape: &[u64]) -> Vec<ChunkSelection> {
        if self.0.is_empty() {
            return vec![ChunkSelection { runs: vec![] }];
        }
        std::iter::zip(&self.0, chunk_shape)
            .map(|(slice, chunk)| slice.chunk_runs(*chunk))
            .multi_cartesian_product()
            .map(|runs| ChunkSelection { runs })
            .collect()
    }

    /// Return the row-major element index of the first and last selected elements in an array of `shape`.
    #[must_use]
    pub fn linear_bounds(&self, shape: &[u64]) -> (u64, u64) {
        let strides = strides(shape);
        let first = std::iter::zip(&self.0, &strides)
            .map(|(slice, stride)| slice.start * stride)
            .sum();
        let last = std::iter::zip(&self.0, &strides)
            .map(|(slice, stride)| slice.last() * stride)
            .sum();
        (first, last)
    }
}
