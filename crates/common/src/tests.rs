use super::*;

#[test]
fn config_builder_defaults_match_default_impl() {
    let built = Config::builder().build();
    let defaulted = Config::default();
    assert_eq!(built.data_dir, defaulted.data_dir);
    assert_eq!(built.buffer_pool_entries, defaulted.buffer_pool_entries);
    assert_eq!(built.max_pages_per_file, defaulted.max_pages_per_file);
    assert_eq!(built.buffer_pool_entries, 1000);
    assert_eq!(built.max_pages_per_file, 1000);
}

#[test]
fn config_builder_overrides() {
    let config = Config::builder()
        .data_dir(PathBuf::from("/tmp/x"))
        .buffer_pool_entries(2)
        .max_pages_per_file(5)
        .build();
    assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
    assert_eq!(config.buffer_pool_entries, 2);
    assert_eq!(config.max_pages_per_file, 5);
}

#[test]
fn page_id_orders_and_displays_numerically() {
    assert!(PageId(2) < PageId(10));
    assert_eq!(PageId(42).to_string(), "42");
}

#[test]
fn page_id_serializes_as_plain_number() {
    assert_eq!(serde_json::to_string(&PageId(7)).unwrap(), "7");
    let back: PageId = serde_json::from_str("7").unwrap();
    assert_eq!(back, PageId(7));
}

#[test]
fn io_errors_convert_into_db_errors() {
    let io = io::Error::new(io::ErrorKind::NotFound, "gone");
    let err: DbError = io.into();
    assert!(matches!(err, DbError::Io(_)));
}
