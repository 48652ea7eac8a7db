use conveyor::Manifest;
use conveyor::validation::validate_manifest;
use std::path::Path;

#[test]
fn quickstart_manifest_is_valid() {
    let manifest = Manifest::load(Path::new("manifests/quickstart.yaml"))
        .expect("quickstart manifest should load");
    let report = validate_manifest(&manifest);
    assert!(
        report.is_ok(),
        "quickstart manifest should pass validation: {:?}",
        report.errors
    );
}
