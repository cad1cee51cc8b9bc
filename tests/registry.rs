mod common;

use common::{model_settings, FakeLoader};
use nlp_service::{
    config::ModelEntry,
    nlp::registry::{ModelRegistry, Task, UnsupportedLoader},
};

#[test]
fn builds_every_enabled_model() {
    let root = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::build(&model_settings(root.path(), true), &FakeLoader::default())
        .unwrap();
    assert_eq!(
        registry.loaded_tasks(),
        vec![
            "ner",
            "question-answering",
            "translation:ensemble",
            "translation:standard",
            "zero-shot",
        ]
    );
    assert_eq!(registry.translation("standard").unwrap().kind(), "standard");
    assert_eq!(registry.translation("ensemble").unwrap().kind(), "ensemble");
}

#[test]
fn disabled_entries_are_absent() {
    let root = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::build(&model_settings(root.path(), false), &FakeLoader::default())
        .unwrap();
    assert!(registry.is_empty());
    assert!(registry.resolve(&Task::Ner).is_none());
    assert!(registry.translation("standard").is_none());
}

#[test]
fn missing_directory_is_absent_not_fatal() {
    let root = tempfile::tempdir().unwrap();
    let mut settings = model_settings(root.path(), true);
    settings.ner = ModelEntry::new(root.path().join("nowhere"), true);
    let registry = ModelRegistry::build(&settings, &FakeLoader::default()).unwrap();
    assert!(registry.ner().is_none());
    assert!(registry.question_answering().is_some());
}

#[test]
fn ensemble_failure_degrades_to_absent() {
    let root = tempfile::tempdir().unwrap();
    let loader = FakeLoader {
        fail_ensemble: true,
        ..FakeLoader::default()
    };
    let registry = ModelRegistry::build(&model_settings(root.path(), true), &loader).unwrap();
    assert!(registry.translation("ensemble").is_none());
    assert!(registry.translation("standard").is_some());
}

#[test]
fn standard_failure_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let loader = FakeLoader {
        fail_ner: true,
        ..FakeLoader::default()
    };
    let err = ModelRegistry::build(&model_settings(root.path(), true), &loader).unwrap_err();
    assert!(format!("{err:#}").contains("model artefact missing"));
}

#[test]
fn unsupported_build_drops_ensembles_only() {
    let root = tempfile::tempdir().unwrap();
    let mut settings = model_settings(root.path(), true);
    settings.ner.load = false;
    settings.question_answering.load = false;
    settings.zero_shot.load = false;
    settings.translation.retain(|t| t.variant == "ensemble");
    let registry = ModelRegistry::build(&settings, &UnsupportedLoader).unwrap();
    assert!(registry.is_empty());
}
