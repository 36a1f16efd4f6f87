pub mod env;
pub mod helix;
pub mod telemetry;

/// Compares two `&str`s without short-circuiting on the first differing byte, so response timing
/// says nothing about how much of a guessed token was right.
pub fn constant_time_cmp(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let res = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (l, r)| acc | std::hint::black_box(l ^ r));

    std::hint::black_box(res) == 0
}
