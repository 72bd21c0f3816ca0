//! Integration tests for the bundled migration presets.

mod fixture;
mod presets;
