mod assembly;
mod config;
mod interpolation;
mod kernels;
mod multi_index;
