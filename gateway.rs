use crate::artifact::ArtifactSource;
use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::models::Prediction;
use crossbeam_channel::RecvTimeoutError;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

fn ensure_environment() -> Result<()> {
    let committed = ort::init()
        .with_name("labelscope")
        .commit()
        .map_err(|e| Error::ModelUnavailable(format!("Failed to init ORT environment: {e}")))?;
    if committed {
        if let Ok(env) = ort::environment::get_environment() {
            env.set_log_level(ort::logging::LogLevel::Warning);
        }
    }
    Ok(())
}

/// A lazily initialized shared slot. At most one loader runs even when
/// callers race: losers block on the init lock, then reuse the memoized
/// value. The load itself runs on a worker thread bounded by `timeout`; a
/// failed or timed-out load leaves the slot empty so a later call may try
/// again once the underlying problem is resolved.
struct InitCell<T> {
    cell: OnceLock<Arc<T>>,
    init_lock: Mutex<()>,
}

impl<T: Send + Sync + 'static> InitCell<T> {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    fn get_or_init<F>(&self, timeout: Duration, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        let _guard = lock_unpoisoned(&self.init_lock);
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name("model-init".into())
            .spawn(move || {
                let _ = tx.send(load());
            })?;
        let loaded = match rx.recv_timeout(timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::ModelUnavailable(format!(
                    "Initialization timed out after {}s",
                    timeout.as_secs()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::ModelUnavailable(
                    "Initialization thread terminated unexpectedly".into(),
                ))
            }
        };

        let shared = Arc::new(loaded);
        let _ = self.cell.set(shared.clone());
        Ok(shared)
    }
}

fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct LoadedModel {
    // `Session::run` takes `&mut self`, so concurrent predictions serialize
    // on this lock.
    session: Mutex<Session>,
    vocabulary: Arc<Vec<String>>,
    input_name: String,
    input_size: u32,
}

/// Owns the single loaded classifier for the process lifetime. Vocabulary
/// and session are shared read-only by all callers once initialization
/// completes.
pub struct ModelGateway {
    config: ClassifierConfig,
    artifacts: Arc<dyn ArtifactSource>,
    model: InitCell<LoadedModel>,
}

impl ModelGateway {
    pub fn new(config: ClassifierConfig, artifacts: Arc<dyn ArtifactSource>) -> Self {
        Self {
            config,
            artifacts,
            model: InitCell::new(),
        }
    }

    /// Loads the model on first use and returns the fixed, ordered label
    /// vocabulary. Memoized for all subsequent calls.
    pub fn initialize(&self) -> Result<Arc<Vec<String>>> {
        Ok(self.loaded()?.vocabulary.clone())
    }

    /// Runs one inference on an already-normalized image. Transient failures
    /// are retried once before surfacing.
    pub fn predict(&self, image: &RgbImage) -> Result<Prediction> {
        let model = self.loaded()?;
        match run_inference(&model, image) {
            Err(Error::Inference(reason)) => {
                log::warn!("Inference failed, retrying once: {reason}");
                run_inference(&model, image)
            }
            other => other,
        }
    }

    fn loaded(&self) -> Result<Arc<LoadedModel>> {
        let config = self.config.clone();
        let artifacts = self.artifacts.clone();
        let timeout = Duration::from_secs(self.config.init_timeout_secs);
        self.model
            .get_or_init(timeout, move || load_model(&config, artifacts.as_ref()))
    }
}

fn load_model(config: &ClassifierConfig, artifacts: &dyn ArtifactSource) -> Result<LoadedModel> {
    let model_path = artifacts.fetch(&config.model_artifact)?;
    ensure_environment()?;
    let session = Session::builder()
        .map_err(|e| Error::ModelUnavailable(format!("{e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level1)
        .map_err(|e| Error::ModelUnavailable(format!("{e}")))?
        .commit_from_file(&model_path)
        .map_err(|e| Error::ModelUnavailable(format!("{e}")))?;
    let input_name = session
        .inputs
        .first()
        .map(|input| input.name.clone())
        .ok_or_else(|| Error::ModelUnavailable("Model declares no inputs".into()))?;

    let vocabulary = load_vocabulary(&resolve_labels_path(config, &model_path))?;
    log::info!(
        "Loaded model {} with {} labels",
        model_path.display(),
        vocabulary.len()
    );
    Ok(LoadedModel {
        session: Mutex::new(session),
        vocabulary: Arc::new(vocabulary),
        input_name,
        input_size: config.input_size,
    })
}

fn resolve_labels_path(config: &ClassifierConfig, model_path: &Path) -> PathBuf {
    match &config.labels_path {
        Some(path) => path.clone(),
        None => model_path.with_extension("labels.txt"),
    }
}

/// Reads the labels sidecar: one label per line, `#` comments and blank
/// lines skipped, optional numeric index prefixes (`3: dog` or `3 dog`)
/// stripped. The vocabulary must be non-empty and free of duplicates.
fn load_vocabulary(labels_path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(labels_path).map_err(|e| {
        Error::ModelUnavailable(format!(
            "Failed to read labels sidecar {}: {e}",
            labels_path.display()
        ))
    })?;
    let mut labels = Vec::new();
    for line in contents.lines() {
        if let Some(label) = parse_label_line(line) {
            if labels.contains(&label) {
                return Err(Error::ModelUnavailable(format!(
                    "Duplicate label '{label}' in {}",
                    labels_path.display()
                )));
            }
            labels.push(label);
        }
    }
    if labels.is_empty() {
        return Err(Error::ModelUnavailable(format!(
            "Labels sidecar is empty or invalid: {}",
            labels_path.display()
        )));
    }
    Ok(labels)
}

fn parse_label_line(line: &str) -> Option<String> {
    let mut label = line.trim();
    if label.is_empty() || label.starts_with('#') {
        return None;
    }
    if let Some((prefix, rest)) = label.split_once(':') {
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
            label = rest.trim();
        }
    } else {
        let mut parts = label.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");
        if !first.is_empty() && first.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
            label = rest.trim();
        }
    }
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

fn run_inference(model: &LoadedModel, image: &RgbImage) -> Result<Prediction> {
    let tensor = input_tensor(image, model.input_size)?;
    let value = Value::from_array(tensor)
        .map_err(|e| Error::Inference(format!("Failed to build input tensor: {e}")))?;

    let mut session = lock_unpoisoned(&model.session);
    let outputs = session
        .run(ort::inputs![model.input_name.as_str() => value])
        .map_err(|e| Error::Inference(format!("Model run failed: {e}")))?;
    let (_, raw) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| Error::Inference(format!("Failed to extract output tensor: {e}")))?;

    if raw.len() != model.vocabulary.len() {
        return Err(Error::Inference(format!(
            "Model produced {} scores for {} labels",
            raw.len(),
            model.vocabulary.len()
        )));
    }
    let probabilities = softmax(raw);
    let index = argmax(&probabilities);
    Ok(Prediction {
        label: model.vocabulary[index].clone(),
        index,
        probabilities,
    })
}

/// Resizes to the model's square input edge and lays the pixels out as an
/// ImageNet-normalized NCHW tensor.
fn input_tensor(image: &RgbImage, size: u32) -> Result<Array4<f32>> {
    let resized = image::DynamicImage::ImageRgb8(image.clone())
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb32f();
    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        data[idx] = (pixel[0] - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        data[idx + plane] = (pixel[1] - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        data[idx + plane * 2] = (pixel[2] - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
    }
    Array4::from_shape_vec((1, 3, size as usize, size as usize), data)
        .map_err(|e| Error::Inference(format!("Invalid input tensor shape: {e}")))
}

fn softmax(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let max_val = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut exps = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for v in values {
        let e = (v - max_val).exp();
        exps.push(e);
        sum += e;
    }
    if sum <= 0.0 {
        return vec![0.0; values.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

/// First index of the largest value, so equal scores deterministically favor
/// the earlier vocabulary entry.
fn argmax(values: &[f32]) -> usize {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (i, v) in values.iter().enumerate() {
        if *v > best.1 {
            best = (i, *v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn concurrent_first_callers_share_one_load() {
        let cell = Arc::new(InitCell::<Vec<String>>::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            let loads = loads.clone();
            handles.push(std::thread::spawn(move || {
                cell.get_or_init(Duration::from_secs(5), move || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(vec!["cat".to_string(), "dog".to_string()])
                })
                .unwrap()
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        for result in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], result));
        }
    }

    #[test]
    fn init_timeout_becomes_model_unavailable() {
        let cell = InitCell::<()>::new();
        let err = cell
            .get_or_init(Duration::from_millis(20), || {
                std::thread::sleep(Duration::from_secs(5));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[test]
    fn failed_load_leaves_slot_retryable() {
        let cell = InitCell::<u32>::new();
        let err = cell
            .get_or_init(Duration::from_secs(1), || {
                Err(Error::ModelUnavailable("artifact missing".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));

        let value = cell
            .get_or_init(Duration::from_secs(1), || Ok(7))
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[test]
    fn vocabulary_parses_prefixes_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.labels.txt");
        std::fs::write(&path, "# classes\n0: cat\n1 dog\nbird\n\n").unwrap();
        let vocab = load_vocabulary(&path).unwrap();
        assert_eq!(vocab, ["cat", "dog", "bird"]);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.labels.txt");
        std::fs::write(&path, "cat\ndog\ncat\n").unwrap();
        assert!(matches!(
            load_vocabulary(&path),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn missing_sidecar_is_model_unavailable() {
        assert!(matches!(
            load_vocabulary(Path::new("/nonexistent/m.labels.txt")),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn softmax_is_a_distribution() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
    }

    #[test]
    fn input_tensor_has_nchw_shape() {
        let img = RgbImage::from_pixel(10, 6, image::Rgb([128, 64, 32]));
        let tensor = input_tensor(&img, 8).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 8, 8]);
    }
}
