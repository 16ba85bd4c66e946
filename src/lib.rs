pub mod config;
pub mod data_io;
pub mod masked;
pub mod sampler;

pub use config::SamplerConfig;
pub use data_io::{GridSource, MemorySource, NetcdfSource, SourceError};
pub use masked::MaskedGrid3;
pub use sampler::{
    AlignmentPolicy, OutputRank, Patch, PatchSampler, SamplerError, SelectMode, Selection,
};
