//! # Artifact Naming Conventions
//!
//! Safenames are built as `<url-leaf>.<digest>` so that two URLs serving the
//! same file name with different content never collide in `pending` or
//! `verifying`. The verified store keys on the digest directory, so the
//! suffix is stripped again to produce the final filename.
//!
//! Certificates fetched by an external collaborator are stored under the
//! last path component of their URL.

/// Return the last `/`-separated component of a URL.
///
/// A URL without any `/` is returned unchanged.
pub fn url_to_filename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Strip the trailing `.<digest>` disambiguation suffix from a safename.
///
/// A safename without any `.` has no suffix to strip and is returned as-is.
pub fn safename_to_filename(safename: &str) -> String {
    match safename.rsplit_once('.') {
        Some((stem, _digest)) => stem.to_string(),
        None => safename.to_string(),
    }
}

/// Build a safename for content found on disk without its original URL.
///
/// Used by crash recovery: the verified store only retains the final
/// filename and the digest directory name.
pub fn synthesize_safename(filename: &str, digest: &str) -> String {
    format!("{filename}.{digest}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DIGEST: &str = "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";

    #[test]
    fn url_to_filename_takes_last_component() {
        assert_eq!(
            url_to_filename("https://certs.example.com/v1/signer.pem"),
            "signer.pem"
        );
        assert_eq!(url_to_filename("signer.pem"), "signer.pem");
        assert_eq!(url_to_filename("https://host/dir/"), "");
    }

    #[test]
    fn safename_to_filename_strips_digest() {
        let safename = format!("ubuntu.qcow2.{DIGEST}");
        assert_eq!(safename_to_filename(&safename), "ubuntu.qcow2");
    }

    #[test]
    fn safename_without_suffix_is_unchanged() {
        assert_eq!(safename_to_filename("image"), "image");
    }

    #[test]
    fn synthesized_safename_matches_convention() {
        assert_eq!(
            synthesize_safename("rootfs.img", DIGEST),
            format!("rootfs.img.{DIGEST}")
        );
    }

    proptest! {
        #[test]
        fn synthesized_safename_strips_back_to_filename(
            filename in "[a-zA-Z0-9_.-]{1,40}",
            digest in "[0-9a-f]{64}",
        ) {
            let safename = synthesize_safename(&filename, &digest);
            prop_assert_eq!(safename_to_filename(&safename), filename);
        }
    }
}
