//! Recorded feature slices played back against the audio clock.

use super::window::SliceSource;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Serves pre-computed slices from a JSON-lines file, one `[i8, ...]` array
/// per line. The slice for a timestamp is chosen by its stride step, so a
/// recording loops once the clock runs past its end.
#[derive(Debug, Clone)]
pub struct ReplaySliceSource {
    slices: Vec<Vec<i8>>,
    stride_ms: i64,
}

impl ReplaySliceSource {
    pub fn load(path: &Path, slice_size: usize, stride_ms: i64) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read feature slices {}", path.display()))?;
        let mut slices = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let slice: Vec<i8> = serde_json::from_str(line).with_context(|| {
                format!("{}:{}: invalid feature slice", path.display(), line_no + 1)
            })?;
            slices.push(slice);
        }
        Self::from_slices(slices, slice_size, stride_ms)
            .with_context(|| format!("invalid feature slices in {}", path.display()))
    }

    pub fn from_slices(slices: Vec<Vec<i8>>, slice_size: usize, stride_ms: i64) -> Result<Self> {
        if slices.is_empty() {
            bail!("no feature slices recorded");
        }
        if let Some((idx, bad)) = slices
            .iter()
            .enumerate()
            .find(|(_, slice)| slice.len() != slice_size)
        {
            bail!(
                "slice {idx} has {} values, expected {slice_size}",
                bad.len()
            );
        }
        Ok(Self {
            slices,
            stride_ms: stride_ms.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl SliceSource for ReplaySliceSource {
    fn generate(&mut self, start_ms: i64, out: &mut [i8]) -> Result<()> {
        let step = start_ms.div_euclid(self.stride_ms);
        let idx = step.rem_euclid(self.slices.len() as i64) as usize;
        let slice = &self.slices[idx];
        if slice.len() != out.len() {
            bail!(
                "recorded slice has {} values but the window expects {}",
                slice.len(),
                out.len()
            );
        }
        out.copy_from_slice(slice);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_loops_over_recorded_slices() {
        let mut source =
            ReplaySliceSource::from_slices(vec![vec![1, 1], vec![2, 2], vec![3, 3]], 2, 20).unwrap();
        let mut out = [0i8; 2];
        source.generate(40, &mut out).unwrap();
        assert_eq!(out, [3, 3]);
        source.generate(60, &mut out).unwrap();
        assert_eq!(out, [1, 1]);
        source.generate(-20, &mut out).unwrap();
        assert_eq!(out, [3, 3]);
    }

    #[test]
    fn replay_rejects_wrong_slice_width() {
        let err = ReplaySliceSource::from_slices(vec![vec![1, 1], vec![2]], 2, 20).unwrap_err();
        assert!(err.to_string().contains("slice 1 has 1 values"));
    }

    #[test]
    fn replay_load_reports_bad_line() {
        let path = std::env::temp_dir().join(format!("catbell_slices_{}.jsonl", std::process::id()));
        fs::write(&path, "[1, 2]\n\n[3, nope]\n").unwrap();
        let err = ReplaySliceSource::load(&path, 2, 20).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(format!("{err:#}").contains(":3: invalid feature slice"));
    }
}
