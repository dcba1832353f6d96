//! Short content hashes for ids and fingerprinted file names.

/// Number of hash bytes kept in short ids (hex doubles the length).
const SHORT_LEN: usize = 4;

/// Short, stable hex digest of `bytes`.
pub fn short_hash(bytes: impl AsRef<[u8]>) -> String {
    let hash = blake3::hash(bytes.as_ref());
    hex::encode(&hash.as_bytes()[..SHORT_LEN])
}

/// Incremental variant of [`short_hash`] over several parts.
#[derive(Default)]
pub struct Fingerprint {
    hasher: blake3::Hasher,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, part: impl AsRef<[u8]>) -> &mut Self {
        let part = part.as_ref();
        // Length prefix keeps ("ab", "c") distinct from ("a", "bc")
        self.hasher.update(&(part.len() as u64).to_le_bytes());
        self.hasher.update(part);
        self
    }

    pub fn finish(&self) -> String {
        hex::encode(&self.hasher.finalize().as_bytes()[..SHORT_LEN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_is_stable() {
        assert_eq!(short_hash("posts/hello.md"), short_hash("posts/hello.md"));
        assert_eq!(short_hash("x").len(), SHORT_LEN * 2);
    }

    #[test]
    fn test_short_hash_differs() {
        assert_ne!(short_hash("a.md"), short_hash("b.md"));
    }

    #[test]
    fn test_fingerprint_part_boundaries() {
        let a = Fingerprint::new().update("ab").update("c").finish();
        let b = Fingerprint::new().update("a").update("bc").finish();
        assert_ne!(a, b);
    }
}
