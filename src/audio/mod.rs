pub mod analysis;
pub mod decode;
pub mod descriptors;
pub mod features;
pub mod onset;
pub mod spectral;
pub mod tempo;
