pub mod records;
pub mod sexp;

// Re-export for convenience
pub use records::{read_netlist, records_from_str, Field, NetRecord, PartRecord, ReadError, Record};
pub use sexp::{parse_str, ParseError, SExp, SExpParser};
