/// Share code generation
use rand::Rng;

/// Uppercase alphanumerics without I, O, 0 and 1
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LENGTH: usize = 8;

/// Generate a candidate share code. Uniqueness is the store's job.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();

    (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Canonical form used for every lookup
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Whether a normalized code could have been produced by `generate_code`
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_codes_use_alphabet() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)), "bad code {}", code);
            assert!(!code.contains(['I', 'O', '0', '1']));
        }
    }

    #[test]
    fn test_alphabet_has_32_distinct_symbols() {
        let symbols: HashSet<u8> = ALPHABET.iter().copied().collect();
        assert_eq!(symbols.len(), 32);
    }

    #[test]
    fn test_generated_codes_are_varied() {
        let codes: HashSet<String> = (0..200).map(|_| generate_code()).collect();
        // 32^8 possible codes; 200 draws colliding would mean a broken RNG
        assert_eq!(codes.len(), 200);
    }

    #[test]
    fn test_normalize_and_well_formed() {
        assert_eq!(normalize_code("  abcd2345 "), "ABCD2345");
        assert!(is_well_formed(&normalize_code("abcd2345")));
        assert!(!is_well_formed("ABCD234"));
        assert!(!is_well_formed("ABCD2341"));
        assert!(!is_well_formed("ABCDO345"));
    }
}
