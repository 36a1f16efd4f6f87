pub mod account;
pub mod exchange;
pub mod item;
pub mod reward;

#[inline]
pub const fn default_limit() -> i64 {
    10
}
