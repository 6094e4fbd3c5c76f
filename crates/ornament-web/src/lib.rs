//! Ornament Tree Web - WebGPU-powered 3D holiday tree
//!
//! This crate provides the browser frontend using Bevy and WebGPU: the tree
//! scene, the ornament form and popup, and live sync with the hosted store.

mod app;
mod network;
mod scene;
mod ui;

use wasm_bindgen::prelude::*;

/// Entry point for WASM module
#[wasm_bindgen(start)]
pub fn main() {
    // Set panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging with filtering to reduce wgpu noise
    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::INFO)
            .build(),
    );

    // Missing store credentials are fatal: nothing to sync with
    let store_config = match network::load_store_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Cannot start: {}", e);
            return;
        }
    };

    app::run(store_config);
}
