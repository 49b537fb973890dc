//! Block writing support.
//!
//! Channel group blocks are written in two phases. The first write emits the
//! children (channels, name text, source information, sample reductions,
//! comment), then the CGBLOCK itself, and records where the sample count and
//! VLSD size fields landed. Once all records are appended, a second write
//! patches only those fields in place.
//!
//! ```text
//! first write:  CN CN TX SI SR MD [CG]      <- patch points recorded
//! records:      ......................       <- data appended elsewhere
//! update:            CG.cycles / CG.bytes    <- overwritten in place
//! ```
//!
//! The output is abstracted by [`MdfWrite`]; [`FileWriter`] writes to disk
//! through a buffered file and [`VecWriter`] builds the file in memory.

mod link_list;
mod traits;

pub use link_list::{LinkedBlock, write_link_list};
pub use traits::{FileWriter, MdfWrite, VecWriter};
