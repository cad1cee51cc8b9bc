use assert_cmd::Command;

#[test]
fn cli_help_runs() {
    let mut cmd = Command::cargo_bin("nlp-service").expect("binary exists");
    cmd.arg("--help").assert().success();
}

#[test]
fn translate_without_model_reports_not_loaded() {
    let root = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("nlp-service").expect("binary exists");
    cmd.env("NLP_ROOT", root.path())
        .env("TRANSLATION_MODELS", "en-fr")
        .env("NER_MODEL_LOAD", "false")
        .env("QA_MODEL_LOAD", "false")
        .env("ZS_MODEL_LOAD", "false")
        .args(["translate", "--model", "en-fr", "Hello"])
        .assert()
        .success()
        .stdout("Model not loaded.\n");
}
