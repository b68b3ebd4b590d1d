use lf_telemetry::logging::{self, LogFormat};

#[test]
fn second_init_is_a_no_op() {
    // Whichever test runs first installs the subscriber; later calls must
    // report that nothing changed instead of panicking.
    logging::init_logging("leadflow-test", "debug");
    assert!(!logging::init_logging("leadflow-test", "info"));
    assert!(!logging::init_logging_json("leadflow-test-json", "info"));

    tracing::info!(lead_id = "abc", "structured log line");
}

#[test]
fn bad_default_level_falls_back() {
    // Builds a filter rather than panicking on a malformed directive.
    let _filter = logging::env_filter("lf_engine=notalevel[");
}

#[test]
fn json_flag_selects_format() {
    assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
    assert_eq!(LogFormat::from_json_flag(false), LogFormat::Pretty);
    assert_eq!(LogFormat::default(), LogFormat::Pretty);
}
