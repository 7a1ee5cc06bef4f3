//! Integration tests for the svmkit library
//!
//! These tests verify end-to-end functionality across modules: training,
//! normalization, classification, and model persistence.

use svmkit::api::Svm;
use svmkit::core::{CancelFlag, FeatureVector, NullProgress, Problem};
use svmkit::kernel::KernelFunction;
use svmkit::normalize::{FeatureGroup, NormalizationMode, Normalizer};
use svmkit::store::{load_classifier, save_classifier};
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two linearly separable 2-D clusters, four points each
fn two_cluster_problem() -> Problem {
    let vectors = vec![
        FeatureVector::new(vec![2.0, 2.0], 1.0),
        FeatureVector::new(vec![2.3, 1.7], 1.0),
        FeatureVector::new(vec![1.7, 2.3], 1.0),
        FeatureVector::new(vec![2.2, 2.2], 1.0),
        FeatureVector::new(vec![-2.0, -2.0], -1.0),
        FeatureVector::new(vec![-2.3, -1.7], -1.0),
        FeatureVector::new(vec![-1.7, -2.3], -1.0),
        FeatureVector::new(vec![-2.2, -2.2], -1.0),
    ];
    Problem::new(vectors).expect("valid problem")
}

fn three_cluster_problem() -> Problem {
    let mut vectors = Vec::new();
    for (label, cx, cy) in [(0.0, 0.0, 0.0), (1.0, 5.0, 0.0), (2.0, 0.0, 5.0)] {
        for (dx, dy) in [(0.0, 0.0), (0.3, 0.1), (-0.2, 0.2), (0.1, -0.3)] {
            vectors.push(FeatureVector::new(vec![cx + dx, cy + dy], label));
        }
    }
    Problem::new(vectors).expect("valid problem")
}

#[test]
fn test_separable_clusters_rbf_with_store_round_trip() {
    init_logging();

    let problem = two_cluster_problem();
    let model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .with_c(1.0)
        .train(&problem)
        .expect("training should succeed");

    // One support vector per class at minimum
    let binary = &model.binary_models()[0];
    assert!(binary.coefficients().iter().any(|&c| c > 0.0));
    assert!(binary.coefficients().iter().any(|&c| c < 0.0));

    // Points far from the boundary carry their cluster's label
    let far_pos = FeatureVector::new(vec![4.0, 4.0], 0.0);
    let far_neg = FeatureVector::new(vec![-4.0, -4.0], 0.0);
    assert_eq!(model.classify(&far_pos).expect("classify"), 1.0);
    assert_eq!(model.classify(&far_neg).expect("classify"), -1.0);

    // A point exactly at the midpoint of the cluster centers classifies
    // identically before and after a store round trip
    let midpoint = FeatureVector::new(vec![0.0, 0.0], 0.0);
    let before = model.classify(&midpoint).expect("classify");

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("model.json");
    save_classifier(&path, &model, None).expect("save should succeed");
    let (reloaded, _) = load_classifier(&path).expect("load should succeed");

    assert_eq!(reloaded.classify(&midpoint).expect("classify"), before);

    // Support vector data survives bit for bit
    let reloaded_binary = &reloaded.binary_models()[0];
    assert_eq!(reloaded_binary.support_vectors(), binary.support_vectors());
    assert_eq!(reloaded_binary.coefficients(), binary.coefficients());
    assert_eq!(reloaded_binary.rho(), binary.rho());
}

#[test]
fn test_three_class_votes_end_to_end() {
    init_logging();

    let problem = three_cluster_problem();
    let model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .train(&problem)
        .expect("training should succeed");

    // A query identical to a class-2 training vector receives exactly two
    // votes for class 2 and classifies as class 2
    let query = problem
        .vectors()
        .iter()
        .find(|v| v.label() == 2.0)
        .expect("class 2 vector")
        .clone();
    let outcome = model.classify_with_votes(&query).expect("classify");
    assert_eq!(outcome.votes[2], 2);
    assert_eq!(outcome.label, 2.0);

    // Training labels are reproduced on the training set
    for v in problem.vectors() {
        assert_eq!(model.classify(v).expect("classify"), v.label());
    }
}

#[test]
fn test_normalization_pipeline_end_to_end() {
    init_logging();

    // Raw features on wildly different scales
    let raw_train = vec![
        FeatureVector::new(vec![1000.0, 0.001], 1.0),
        FeatureVector::new(vec![1100.0, 0.0012], 1.0),
        FeatureVector::new(vec![900.0, 0.0011], 1.0),
        FeatureVector::new(vec![-1000.0, -0.001], -1.0),
        FeatureVector::new(vec![-1100.0, -0.0012], -1.0),
        FeatureVector::new(vec![-900.0, -0.0011], -1.0),
    ];

    let mut normalizer = Normalizer::new(vec![FeatureGroup {
        name: "measurements".to_string(),
        feature_names: vec!["a".to_string(), "b".to_string()],
        mode: NormalizationMode::ZeroMeanUnitStddev,
    }])
    .expect("valid groups");

    normalizer.fit(&raw_train).expect("fit should succeed");

    let mut train = raw_train.clone();
    let status = normalizer
        .apply_batch(&mut train, &NullProgress)
        .expect("batch should succeed");
    assert!(!status.cancelled);

    let problem = Problem::new(train).expect("valid problem");
    let model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .train(&problem)
        .expect("training should succeed");

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("model.json");
    save_classifier(&path, &model, Some(&normalizer)).expect("save should succeed");

    // Classification later: load, normalize the query with the *stored*
    // statistics, classify
    let (model, normalizer) = load_classifier(&path).expect("load should succeed");
    let normalizer = normalizer.expect("normalizer stored with the model");

    let mut query = FeatureVector::new(vec![950.0, 0.00105], 0.0);
    normalizer.apply(&mut query).expect("apply should succeed");
    assert_eq!(model.classify(&query).expect("classify"), 1.0);
}

#[test]
fn test_training_is_deterministic() {
    init_logging();

    let problem = two_cluster_problem();
    let svm = Svm::new().with_kernel(KernelFunction::Rbf { gamma: 0.5 });

    let a = svm.train(&problem).expect("training should succeed");
    let b = svm.train(&problem).expect("training should succeed");

    let ma = &a.binary_models()[0];
    let mb = &b.binary_models()[0];
    assert_eq!(ma.coefficients(), mb.coefficients());
    assert_eq!(ma.rho(), mb.rho());
    assert_eq!(ma.support_vectors(), mb.support_vectors());
}

#[test]
fn test_nu_and_c_variants_agree_on_separable_data() {
    init_logging();

    let problem = two_cluster_problem();
    let c_model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .with_c(1.0)
        .train(&problem)
        .expect("C-SVM training should succeed");
    let nu_model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .with_nu(0.5)
        .train(&problem)
        .expect("nu-SVM training should succeed");

    for v in problem.vectors() {
        assert_eq!(c_model.classify(v).expect("classify"), v.label());
        assert_eq!(nu_model.classify(v).expect("classify"), v.label());
    }
}

#[test]
fn test_cancelled_training_is_marked_incomplete() {
    init_logging();

    let flag = CancelFlag::new();
    flag.cancel();

    let problem = three_cluster_problem();
    let model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .train_with_progress(&problem, &flag)
        .expect("cancelled training still returns a model");

    assert!(!model.is_complete());

    // The incomplete flag survives persistence
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("model.json");
    save_classifier(&path, &model, None).expect("save should succeed");
    let (reloaded, _) = load_classifier(&path).expect("load should succeed");
    assert!(!reloaded.is_complete());
}

#[test]
fn test_batch_classification_matches_single() {
    init_logging();

    let problem = three_cluster_problem();
    let model = Svm::new()
        .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
        .train(&problem)
        .expect("training should succeed");

    let queries: Vec<FeatureVector> = problem.vectors().to_vec();
    let batch = model
        .classify_batch(&queries, &NullProgress)
        .expect("batch should succeed");

    assert_eq!(batch.status.completed, queries.len());
    for (label, v) in batch.labels.iter().zip(queries.iter()) {
        assert_eq!(*label, Some(model.classify(v).expect("classify")));
    }
}
