mod allocator;
mod common;
