//! Checks that the shipped YAML rule files stay in sync with the
//! built-in catalog definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use coach_core::config::EngineConfig;
use coach_inference::catalog;
use coach_inference::loader;

fn rules_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/rules")
}

#[test]
fn shipped_rule_files_all_load() {
    let outcome = loader::load_dir(&rules_dir()).unwrap();
    assert_eq!(outcome.definitions.len(), 4);
    for result in &outcome.results {
        assert!(
            matches!(result.status, loader::LoadStatus::Loaded { .. }),
            "{} did not load: {:?}",
            result.path.display(),
            result.status
        );
    }
}

#[test]
fn shipped_rule_files_match_the_catalog() {
    let outcome = loader::load_dir(&rules_dir()).unwrap();
    let from_files: BTreeMap<_, _> = outcome
        .definitions
        .into_iter()
        .map(|def| (def.name.clone(), def))
        .collect();
    let from_catalog: BTreeMap<_, _> = catalog::definitions(&EngineConfig::default())
        .into_iter()
        .map(|def| (def.name.clone(), def))
        .collect();

    let file_names: Vec<_> = from_files.keys().cloned().collect();
    let catalog_names: Vec<_> = from_catalog.keys().cloned().collect();
    assert_eq!(file_names, catalog_names);

    for (name, file_def) in &from_files {
        let catalog_def = &from_catalog[name];
        assert_eq!(file_def.priority, catalog_def.priority, "{name}");
        assert_eq!(file_def.handler, catalog_def.handler, "{name}");
        assert_eq!(file_def.event.kind, catalog_def.event.kind, "{name}");
        assert_eq!(
            file_def.event.params.subtype, catalog_def.event.params.subtype,
            "{name}"
        );
        assert_eq!(
            file_def.event.params.parent_subtype, catalog_def.event.params.parent_subtype,
            "{name}"
        );
    }
}

#[tokio::test]
async fn an_engine_built_from_the_files_validates() {
    let outcome = loader::load_dir(&rules_dir()).unwrap();
    let engine = coach_inference::Engine::builder()
        .rules(outcome.definitions)
        .handlers(catalog::handlers())
        .dynamic_facts(catalog::dynamic_facts())
        .build();
    assert!(engine.is_ok());
}
