//! Progress checkpoints for long evaluation runs.
//!
//! The likelihood loop spends minutes per image, so partial results are
//! flushed after every image (and every ELBO chunk): the metric arrays as
//! `.npy` files plus a JSON sidecar with the current step and timing. File
//! names embed the batch size and importance-sample count so runs with
//! different settings never clobber each other.

use indexmap::IndexMap;
use ndarray::Array1;
use ndarray_npy::WriteNpyExt;
use serde_json::json;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct ProgressWriter {
    output_dir: PathBuf,
    stem: String,
    started: Instant,
}

impl ProgressWriter {
    /// Writer for a run over `batch_size` images with `k` importance samples.
    pub fn new(output_dir: &Path, batch_size: usize, k: usize) -> Result<Self, String> {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| format!("create {:?}: {e}", output_dir))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            stem: format!("test_metrics_batch{batch_size}_{k}samp"),
            started: Instant::now(),
        })
    }

    fn write_array(&self, suffix: &str, values: &[f64]) -> Result<PathBuf, String> {
        let path = self.output_dir.join(format!("{}_{suffix}.npy", self.stem));
        let file = File::create(&path).map_err(|e| format!("create {:?}: {e}", path))?;
        Array1::from_vec(values.to_vec())
            .write_npy(file)
            .map_err(|e| format!("write {:?}: {e}", path))?;
        Ok(path)
    }

    fn write_sidecar(&self, step: usize, extra: IndexMap<String, serde_json::Value>) -> Result<(), String> {
        let mut fields = IndexMap::new();
        fields.insert("step".to_string(), json!(step));
        fields.insert(
            "elapsed_seconds".to_string(),
            json!(self.started.elapsed().as_secs_f64()),
        );
        fields.extend(extra);

        let path = self.output_dir.join(format!("{}_progress.json", self.stem));
        let body = serde_json::to_string_pretty(&fields)
            .map_err(|e| format!("serialize progress: {e}"))?;
        std::fs::write(&path, body).map_err(|e| format!("write {:?}: {e}", path))
    }

    /// Flush partial likelihood arrays after image `step`.
    pub fn write_likelihood(
        &mut self,
        step: usize,
        raw: &[f64],
        with_constants: &[f64],
        seconds: &[f64],
    ) -> Result<(), String> {
        self.write_array("ll", with_constants)?;
        self.write_array("ll_raw", raw)?;
        self.write_array("time", seconds)?;

        let mut extra = IndexMap::new();
        extra.insert("metric".to_string(), json!("log_likelihood"));
        extra.insert("n_images".to_string(), json!(with_constants.len()));
        self.write_sidecar(step, extra)
    }

    /// Flush partial ELBO/MSE arrays after chunk `step`.
    pub fn write_elbo(&mut self, step: usize, elbo: &[f64], mse: &[f64]) -> Result<(), String> {
        self.write_array("elbo", elbo)?;
        self.write_array("mse", mse)?;

        let mut extra = IndexMap::new();
        extra.insert("metric".to_string(), json!("elbo"));
        extra.insert("n_batches".to_string(), json!(elbo.len()));
        self.write_sidecar(step, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::ReadNpyExt;

    #[test]
    fn test_progress_writes_arrays_and_sidecar() {
        let dir = std::env::temp_dir().join("latro_test_progress");
        let mut writer = ProgressWriter::new(&dir, 100, 10).unwrap();

        writer
            .write_likelihood(1, &[-10.0, -11.0], &[-500.0, -501.0], &[0.5, 0.6])
            .unwrap();

        let ll_path = dir.join("test_metrics_batch100_10samp_ll.npy");
        let file = File::open(&ll_path).unwrap();
        let arr = Array1::<f64>::read_npy(file).unwrap();
        assert_eq!(arr.len(), 2);
        assert!((arr[0] + 500.0).abs() < 1e-12);

        let sidecar = dir.join("test_metrics_batch100_10samp_progress.json");
        let body = std::fs::read_to_string(&sidecar).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["step"], 1);
        assert_eq!(parsed["metric"], "log_likelihood");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_progress_overwrites_in_place() {
        let dir = std::env::temp_dir().join("latro_test_progress_overwrite");
        let mut writer = ProgressWriter::new(&dir, 10, 5).unwrap();

        writer.write_elbo(0, &[-1.0], &[0.1]).unwrap();
        writer.write_elbo(1, &[-1.0, -2.0], &[0.1, 0.2]).unwrap();

        let file = File::open(dir.join("test_metrics_batch10_5samp_elbo.npy")).unwrap();
        let arr = Array1::<f64>::read_npy(file).unwrap();
        assert_eq!(arr.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
