//! Fixed-length feature window and the slice-stride bookkeeping that fills it.

use super::{DEFAULT_SLICE_COUNT, DEFAULT_SLICE_SIZE, DEFAULT_SLICE_STRIDE_MS};
use anyhow::{bail, Result};

/// Shape of the feature window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    pub slice_size: usize,
    pub slice_count: usize,
    pub stride_ms: i64,
}

impl FeatureLayout {
    pub const fn element_count(&self) -> usize {
        self.slice_size * self.slice_count
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            slice_size: DEFAULT_SLICE_SIZE,
            slice_count: DEFAULT_SLICE_COUNT,
            stride_ms: DEFAULT_SLICE_STRIDE_MS,
        }
    }
}

/// Quantized features, oldest slice first. The length is fixed at construction.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    layout: FeatureLayout,
    data: Box<[i8]>,
}

impl FeatureWindow {
    pub fn new(layout: FeatureLayout) -> Self {
        Self {
            layout,
            data: vec![0; layout.element_count()].into_boxed_slice(),
        }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append whole slices at the tail, shifting older slices toward the head
    /// and dropping the oldest ones that no longer fit.
    pub fn append_slices(&mut self, slices: &[i8]) -> Result<()> {
        let size = self.layout.slice_size;
        if size == 0 || slices.len() % size != 0 {
            bail!(
                "feature data length {} is not a multiple of the slice size {size}",
                slices.len()
            );
        }
        let incoming = slices.len().min(self.data.len());
        let slices = &slices[slices.len() - incoming..];
        let keep = self.data.len() - incoming;
        if keep > 0 {
            self.data.copy_within(incoming.., 0);
        }
        self.data[keep..].copy_from_slice(slices);
        Ok(())
    }
}

/// External frontend producing one feature slice for the audio starting at
/// `start_ms`.
pub trait SliceSource: Send {
    fn generate(&mut self, start_ms: i64, out: &mut [i8]) -> Result<()>;
}

impl<T: SliceSource + ?Sized> SliceSource for Box<T> {
    fn generate(&mut self, start_ms: i64, out: &mut [i8]) -> Result<()> {
        (**self).generate(start_ms, out)
    }
}

/// Brings a feature window up to date with the audio between two timestamps.
pub trait FeatureProvider: Send {
    /// Append any slices that became available between `previous_time` and
    /// `current_time` and return how many were added. On error the window is
    /// left as it was.
    fn populate(
        &mut self,
        window: &mut FeatureWindow,
        previous_time: i64,
        current_time: i64,
    ) -> Result<usize>;
}

impl<T: FeatureProvider + ?Sized> FeatureProvider for Box<T> {
    fn populate(
        &mut self,
        window: &mut FeatureWindow,
        previous_time: i64,
        current_time: i64,
    ) -> Result<usize> {
        (**self).populate(window, previous_time, current_time)
    }
}

/// Feature provider that maps timestamps to slice steps of `stride_ms` and asks
/// a [`SliceSource`] for each step it has not seen yet.
pub struct SliceFeatureProvider<S> {
    source: S,
    first_run: bool,
    scratch: Vec<i8>,
}

impl<S: SliceSource> SliceFeatureProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            first_run: true,
            scratch: Vec::new(),
        }
    }
}

impl<S: SliceSource> FeatureProvider for SliceFeatureProvider<S> {
    fn populate(
        &mut self,
        window: &mut FeatureWindow,
        previous_time: i64,
        current_time: i64,
    ) -> Result<usize> {
        let layout = window.layout();
        let stride = layout.stride_ms.max(1);
        let last_step = previous_time.div_euclid(stride);
        let current_step = current_time.div_euclid(stride);

        // Nothing cached is trusted on the first call: fill the whole window.
        let needed = if self.first_run {
            layout.slice_count
        } else {
            usize::try_from(current_step - last_step)
                .unwrap_or(0)
                .min(layout.slice_count)
        };
        if needed == 0 {
            return Ok(0);
        }

        self.scratch.clear();
        self.scratch.resize(needed * layout.slice_size, 0);
        let first_step = current_step - needed as i64 + 1;
        for (offset, slice) in self.scratch.chunks_exact_mut(layout.slice_size).enumerate() {
            let start_ms = (first_step + offset as i64) * stride;
            self.source.generate(start_ms, slice)?;
        }
        window.append_slices(&self.scratch)?;
        self.first_run = false;
        Ok(needed)
    }
}
