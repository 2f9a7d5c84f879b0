/// Like the `panic!` macro, but reserved for allocator states that are
/// impossible unless the in-region metadata has been corrupted past recovery
#[macro_export]
macro_rules! bug {
    ($($arg:tt)*) => (panic!("{}", format_args!($($arg)*)));
}
