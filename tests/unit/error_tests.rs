//! Unit tests for the shared error type.

use session_conductor::AppError;

#[test]
fn display_includes_category_prefix() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Validation("empty".into()), "validation: empty"),
        (AppError::QueueFull("cap".into()), "queue full: cap"),
        (AppError::Backend("spawn".into()), "backend: spawn"),
        (AppError::Ipc("pipe".into()), "ipc: pipe"),
        (AppError::NotFound("item".into()), "not found: item"),
        (AppError::Io("disk".into()), "io: disk"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_error_converts_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err: AppError = toml_err.into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn io_error_converts_to_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
    let err: AppError = io_err.into();
    assert!(matches!(err, AppError::Io(_)));
    assert!(err.to_string().contains("gone"));
}
