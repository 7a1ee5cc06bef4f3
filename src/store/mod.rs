//! Model persistence
//!
//! Models and normalization parameters serialize into a hierarchical
//! attribute tree: named groups holding named scalar, text, 1-D and 2-D
//! attributes, with nested child groups per pairwise binary model and per
//! feature group. The tree is written to disk as JSON through a temporary
//! file and an atomic rename, so a failed save never corrupts an existing
//! model file.
//!
//! Loading is strict: a missing key, a wrong attribute type, or a size
//! inconsistent with the declared counts fails explicitly instead of
//! substituting defaults. Loading never needs the original training
//! problem.

use crate::core::{FeatureVector, Result, SvmError};
use crate::kernel::KernelFunction;
use crate::model::{BinaryModel, MultiClassModel};
use crate::normalize::{FeatureGroup, GroupStatistics, NormalizationMode, Normalizer};
use crate::solver::SolveStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Bumped whenever the on-disk layout changes incompatibly
pub const FORMAT_VERSION: i64 = 1;

/// A single named attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Float(f64),
    Int(i64),
    Text(String),
    FloatVec(Vec<f64>),
    IntVec(Vec<i64>),
    TextVec(Vec<String>),
    FloatMatrix {
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
}

/// Node of the hierarchical key/value tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrGroup {
    attributes: BTreeMap<String, AttrValue>,
    children: BTreeMap<String, AttrGroup>,
}

impl AttrGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&mut self, name: &str, value: f64) {
        self.attributes.insert(name.to_string(), AttrValue::Float(value));
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.attributes.insert(name.to_string(), AttrValue::Int(value));
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.attributes
            .insert(name.to_string(), AttrValue::Text(value.to_string()));
    }

    pub fn set_float_vec(&mut self, name: &str, values: Vec<f64>) {
        self.attributes
            .insert(name.to_string(), AttrValue::FloatVec(values));
    }

    pub fn set_int_vec(&mut self, name: &str, values: Vec<i64>) {
        self.attributes
            .insert(name.to_string(), AttrValue::IntVec(values));
    }

    pub fn set_text_vec(&mut self, name: &str, values: Vec<String>) {
        self.attributes
            .insert(name.to_string(), AttrValue::TextVec(values));
    }

    /// Store a row-major matrix
    ///
    /// # Panics
    /// Panics if `values.len() != rows * cols`
    pub fn set_matrix(&mut self, name: &str, rows: usize, cols: usize, values: Vec<f64>) {
        assert_eq!(values.len(), rows * cols, "matrix shape mismatch");
        self.attributes
            .insert(name.to_string(), AttrValue::FloatMatrix { rows, cols, values });
    }

    fn attribute(&self, name: &str) -> Result<&AttrValue> {
        self.attributes
            .get(name)
            .ok_or_else(|| SvmError::MissingAttribute(name.to_string()))
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.attribute(name)? {
            AttrValue::Float(v) => Ok(*v),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "float",
            }),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.attribute(name)? {
            AttrValue::Int(v) => Ok(*v),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "int",
            }),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.attribute(name)? {
            AttrValue::Text(v) => Ok(v),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "text",
            }),
        }
    }

    pub fn float_vec(&self, name: &str) -> Result<&[f64]> {
        match self.attribute(name)? {
            AttrValue::FloatVec(v) => Ok(v),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "float array",
            }),
        }
    }

    pub fn int_vec(&self, name: &str) -> Result<&[i64]> {
        match self.attribute(name)? {
            AttrValue::IntVec(v) => Ok(v),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "int array",
            }),
        }
    }

    pub fn text_vec(&self, name: &str) -> Result<&[String]> {
        match self.attribute(name)? {
            AttrValue::TextVec(v) => Ok(v),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "text array",
            }),
        }
    }

    /// Row-major matrix as `(rows, cols, values)`
    pub fn matrix(&self, name: &str) -> Result<(usize, usize, &[f64])> {
        match self.attribute(name)? {
            AttrValue::FloatMatrix { rows, cols, values } => Ok((*rows, *cols, values)),
            _ => Err(SvmError::AttributeType {
                name: name.to_string(),
                expected: "float matrix",
            }),
        }
    }

    /// Child group, failing explicitly when absent
    pub fn child(&self, name: &str) -> Result<&AttrGroup> {
        self.children
            .get(name)
            .ok_or_else(|| SvmError::MissingAttribute(name.to_string()))
    }

    /// Child group, created when absent
    pub fn ensure_child(&mut self, name: &str) -> &mut AttrGroup {
        self.children.entry(name.to_string()).or_default()
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Write the tree as JSON, atomically
    ///
    /// The content goes to a sibling temporary file first and is renamed
    /// over the target, so an interrupted save leaves any previous file
    /// intact.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_file_name(format!(
            "{}.tmp",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("model")
        ));

        {
            let file = fs::File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)
                .map_err(|e| SvmError::SerializationError(e.to_string()))?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        log::debug!("saved model tree to {}", path.display());
        Ok(())
    }

    /// Read a tree written by [`save_to_file`](Self::save_to_file)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| SvmError::SerializationError(e.to_string()))
    }
}

// Kernel hyperparameters

fn write_kernel(group: &mut AttrGroup, kernel: &KernelFunction) {
    group.set_text("kernel_type", kernel.type_name());
    match *kernel {
        KernelFunction::Linear => {}
        KernelFunction::Polynomial {
            degree,
            gamma,
            coef0,
        } => {
            group.set_int("degree", degree as i64);
            group.set_float("gamma", gamma);
            group.set_float("coef0", coef0);
        }
        KernelFunction::Rbf { gamma } => {
            group.set_float("gamma", gamma);
        }
        KernelFunction::Sigmoid { gamma, coef0 } => {
            group.set_float("gamma", gamma);
            group.set_float("coef0", coef0);
        }
    }
}

fn read_kernel(group: &AttrGroup) -> Result<KernelFunction> {
    match group.text("kernel_type")? {
        "linear" => Ok(KernelFunction::Linear),
        "polynomial" => {
            let degree = group.int("degree")?;
            if degree < 1 {
                return Err(SvmError::InvalidParameter(format!(
                    "invalid polynomial degree {degree}"
                )));
            }
            Ok(KernelFunction::Polynomial {
                degree: degree as u32,
                gamma: group.float("gamma")?,
                coef0: group.float("coef0")?,
            })
        }
        "rbf" => Ok(KernelFunction::Rbf {
            gamma: group.float("gamma")?,
        }),
        "sigmoid" => Ok(KernelFunction::Sigmoid {
            gamma: group.float("gamma")?,
            coef0: group.float("coef0")?,
        }),
        other => Err(SvmError::InvalidParameter(format!(
            "unknown kernel type '{other}'"
        ))),
    }
}

/// Write one binary model into `group`
pub fn write_binary_model(group: &mut AttrGroup, model: &BinaryModel) {
    let (label_pos, label_neg) = model.labels();
    let n_sv = model.n_support_vectors();
    let dim = model.dim();

    group.set_float("label_pos", label_pos);
    group.set_float("label_neg", label_neg);
    group.set_float("rho", model.rho());
    group.set_int("dim", dim as i64);
    group.set_int("n_support_vectors", n_sv as i64);
    group.set_float_vec("coefficients", model.coefficients().to_vec());
    group.set_float_vec(
        "sv_labels",
        model.support_vectors().iter().map(|v| v.label()).collect(),
    );

    let mut values = Vec::with_capacity(n_sv * dim);
    for sv in model.support_vectors() {
        values.extend_from_slice(sv.components());
    }
    group.set_matrix("support_vectors", n_sv, dim, values);
    group.set_text("status", model.status().as_str());
    write_kernel(group.ensure_child("kernel"), model.kernel());
}

/// Read one binary model from `group`, checking every declared size
pub fn read_binary_model(group: &AttrGroup) -> Result<BinaryModel> {
    let label_pos = group.float("label_pos")?;
    let label_neg = group.float("label_neg")?;
    let rho = group.float("rho")?;

    let dim = read_count(group, "dim")?;
    let n_sv = read_count(group, "n_support_vectors")?;

    let coefficients = group.float_vec("coefficients")?;
    if coefficients.len() != n_sv {
        return Err(SvmError::AttributeSize {
            name: "coefficients".to_string(),
            expected: n_sv,
            actual: coefficients.len(),
        });
    }

    let sv_labels = group.float_vec("sv_labels")?;
    if sv_labels.len() != n_sv {
        return Err(SvmError::AttributeSize {
            name: "sv_labels".to_string(),
            expected: n_sv,
            actual: sv_labels.len(),
        });
    }

    let (rows, cols, values) = group.matrix("support_vectors")?;
    if rows != n_sv || cols != dim {
        return Err(SvmError::AttributeSize {
            name: "support_vectors".to_string(),
            expected: n_sv * dim,
            actual: rows * cols,
        });
    }

    let status_text = group.text("status")?;
    let status = SolveStatus::parse(status_text).ok_or_else(|| {
        SvmError::InvalidParameter(format!("unknown solve status '{status_text}'"))
    })?;

    let kernel = read_kernel(group.child("kernel")?)?;

    let support_vectors: Vec<FeatureVector> = values
        .chunks(dim.max(1))
        .take(n_sv)
        .zip(sv_labels.iter())
        .map(|(row, &label)| FeatureVector::new(row.to_vec(), label))
        .collect();

    BinaryModel::from_parts(
        label_pos,
        label_neg,
        kernel,
        dim,
        support_vectors,
        coefficients.to_vec(),
        rho,
        status,
    )
}

/// Write a one-vs-one model into `group`, one child per class pair
pub fn write_multiclass_model(group: &mut AttrGroup, model: &MultiClassModel) {
    let classes = model.classes();
    group.set_float_vec("classes", classes.to_vec());
    group.set_int("n_classes", classes.len() as i64);
    group.set_int("dim", model.dim() as i64);

    let mut models = model.binary_models().iter();
    for a in 0..classes.len() {
        for b in (a + 1)..classes.len() {
            let binary = models.next().expect("one model per class pair");
            write_binary_model(group.ensure_child(&format!("pair_{a}_{b}")), binary);
        }
    }
}

/// Read a one-vs-one model from `group`
pub fn read_multiclass_model(group: &AttrGroup) -> Result<MultiClassModel> {
    let classes = group.float_vec("classes")?.to_vec();
    let n_classes = read_count(group, "n_classes")?;
    if classes.len() != n_classes {
        return Err(SvmError::AttributeSize {
            name: "classes".to_string(),
            expected: n_classes,
            actual: classes.len(),
        });
    }
    let dim = read_count(group, "dim")?;

    let mut models = Vec::with_capacity(n_classes * n_classes.saturating_sub(1) / 2);
    for a in 0..n_classes {
        for b in (a + 1)..n_classes {
            let child = group.child(&format!("pair_{a}_{b}"))?;
            models.push(read_binary_model(child)?);
        }
    }

    MultiClassModel::from_parts(classes, dim, models)
}

/// Write normalization parameters into `group`
pub fn write_normalizer(group: &mut AttrGroup, normalizer: &Normalizer) {
    group.set_text_vec(
        "groups",
        normalizer.groups().iter().map(|g| g.name.clone()).collect(),
    );
    group.set_int("fitted", i64::from(normalizer.is_fitted()));

    for (k, feature_group) in normalizer.groups().iter().enumerate() {
        let child = group.ensure_child(&format!("group_{k}"));
        child.set_text_vec("feature_names", feature_group.feature_names.clone());
        child.set_int("mode", feature_group.mode.flag());
        if let Some(stats) = normalizer.statistics() {
            child.set_float_vec("means", stats[k].means.clone());
            child.set_float_vec("stddevs", stats[k].stddevs.clone());
        }
    }
}

/// Read normalization parameters from `group`
pub fn read_normalizer(group: &AttrGroup) -> Result<Normalizer> {
    let names = group.text_vec("groups")?.to_vec();
    let fitted = group.int("fitted")? != 0;

    let mut groups = Vec::with_capacity(names.len());
    let mut statistics = if fitted { Some(Vec::new()) } else { None };

    for (k, name) in names.iter().enumerate() {
        let child = group.child(&format!("group_{k}"))?;
        let feature_names = child.text_vec("feature_names")?.to_vec();
        let mode = NormalizationMode::from_flag(child.int("mode")?)?;
        groups.push(FeatureGroup {
            name: name.clone(),
            feature_names,
            mode,
        });
        if let Some(stats) = statistics.as_mut() {
            stats.push(GroupStatistics {
                means: child.float_vec("means")?.to_vec(),
                stddevs: child.float_vec("stddevs")?.to_vec(),
            });
        }
    }

    Normalizer::from_parts(groups, statistics)
}

/// Save a multi-class classifier, optionally with its normalizer
pub fn save_classifier<P: AsRef<Path>>(
    path: P,
    model: &MultiClassModel,
    normalizer: Option<&Normalizer>,
) -> Result<()> {
    let mut root = new_root("one_vs_one");
    write_multiclass_model(root.ensure_child("model"), model);
    if let Some(normalizer) = normalizer {
        write_normalizer(root.ensure_child("normalization"), normalizer);
    }
    root.save_to_file(path)
}

/// Load a classifier saved by [`save_classifier`]
pub fn load_classifier<P: AsRef<Path>>(path: P) -> Result<(MultiClassModel, Option<Normalizer>)> {
    let root = AttrGroup::load_from_file(path)?;
    check_root(&root, "one_vs_one")?;
    let model = read_multiclass_model(root.child("model")?)?;
    let normalizer = if root.has_child("normalization") {
        Some(read_normalizer(root.child("normalization")?)?)
    } else {
        None
    };
    Ok((model, normalizer))
}

/// Save a single binary model
pub fn save_binary<P: AsRef<Path>>(path: P, model: &BinaryModel) -> Result<()> {
    let mut root = new_root("binary");
    write_binary_model(root.ensure_child("model"), model);
    root.save_to_file(path)
}

/// Load a binary model saved by [`save_binary`]
pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<BinaryModel> {
    let root = AttrGroup::load_from_file(path)?;
    check_root(&root, "binary")?;
    read_binary_model(root.child("model")?)
}

fn new_root(kind: &str) -> AttrGroup {
    let mut root = AttrGroup::new();
    root.set_int("format_version", FORMAT_VERSION);
    root.set_text("model_kind", kind);
    root.set_text("created_at", &chrono::Utc::now().to_rfc3339());
    root
}

fn check_root(root: &AttrGroup, kind: &str) -> Result<()> {
    let version = root.int("format_version")?;
    if version != FORMAT_VERSION {
        return Err(SvmError::InvalidParameter(format!(
            "unsupported model format version {version}"
        )));
    }
    let found = root.text("model_kind")?;
    if found != kind {
        return Err(SvmError::InvalidParameter(format!(
            "expected a {kind} model file, found '{found}'"
        )));
    }
    Ok(())
}

fn read_count(group: &AttrGroup, name: &str) -> Result<usize> {
    let value = group.int(name)?;
    usize::try_from(value).map_err(|_| {
        SvmError::InvalidParameter(format!("attribute '{name}' must be non-negative, got {value}"))
    })
}
