mod entry;
mod table;
#[cfg(test)]
mod tests;

pub use entry::*;
pub use table::*;
