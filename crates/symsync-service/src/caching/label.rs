use once_cell::sync::Lazy;
use regex::Regex;

static BAD_CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9._+-]").unwrap());

/// Makes a directory name from a source control label.
///
/// Every character that is not safe in a file name is replaced by `_`, one for one, e.g.
/// `//depot/UE4-Releases/4.2/Rocket-CL-2082666` becomes
/// `__depot_UE4-Releases_4.2_Rocket-CL-2082666`. Cleaning a cleaned label is a no-op.
pub fn clean_label(label: &str) -> String {
    let cleaned = BAD_CHAR_RE.replace_all(label, "_");
    match cleaned.as_ref() {
        // these would resolve to the cache root or escape it
        "" => "_".to_owned(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_label() {
        assert_eq!(
            clean_label("//depot/UE4-Releases/4.2/Rocket-CL-2082666"),
            "__depot_UE4-Releases_4.2_Rocket-CL-2082666"
        );
        assert_eq!(clean_label("UE4_CL-12345"), "UE4_CL-12345");
        assert_eq!(clean_label(r"C:\builds\a b"), "C__builds_a_b");
        assert_eq!(clean_label(".."), "__");
        assert_eq!(clean_label(""), "_");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = clean_label("//depot/Main/Label:1*?");
        assert_eq!(clean_label(&once), once);
    }
}
