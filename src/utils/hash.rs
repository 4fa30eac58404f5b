// Content hashing and output filename templates

/// Hex digits kept from the blake3 digest
pub const HASH_LENGTH: usize = 20;

/// Short content fingerprint used for cache busting.
pub fn content_hash(content: &[u8]) -> String {
    let digest = blake3::hash(content).to_hex();
    digest[..HASH_LENGTH].to_string()
}

/// Fingerprint over a set of per-asset hashes, used for `[fullhash]`.
pub fn combined_hash<'a>(hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for hash in hashes {
        hasher.update(hash.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex()[..HASH_LENGTH].to_string()
}

/// Render a filename template.
///
/// Supported tokens: `[name]`, `[contenthash]`, `[fullhash]` and its alias
/// `[hash]`. Unknown tokens are left untouched.
pub fn render_filename(template: &str, name: &str, contenthash: &str, fullhash: &str) -> String {
    template
        .replace("[name]", name)
        .replace("[contenthash]", contenthash)
        .replace("[fullhash]", fullhash)
        .replace("[hash]", fullhash)
}
