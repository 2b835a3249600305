use super::*;

fn scratch_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("boardlink-token-{}", uuid::Uuid::new_v4()))
        .join("nested")
        .join("token")
}

#[test]
fn generated_tokens_are_64_hex_chars_and_distinct() {
    let a = generate_token();
    let b = generate_token();
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}

#[test]
fn token_is_issued_once_and_reused() {
    let path = scratch_path();
    let first = load_or_create_token(&path).unwrap();
    let second = load_or_create_token(&path).unwrap();
    assert_eq!(first, second);
    assert!(path.exists());
    let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
}

#[test]
fn surrounding_whitespace_is_ignored() {
    let path = scratch_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "  abc123\n").unwrap();
    assert_eq!(load_or_create_token(&path).unwrap(), "abc123");
    let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
}

#[test]
fn empty_file_is_an_error() {
    let path = scratch_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "\n").unwrap();
    assert!(matches!(load_or_create_token(&path), Err(TokenError::Empty(_))));
    let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
}

#[cfg(unix)]
#[test]
fn issued_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let path = scratch_path();
    load_or_create_token(&path).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
}
