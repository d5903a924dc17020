//! `novaforge dispatch`

use super::{load_dispatcher, print_json};
use anyhow::Result;
use nova_forge::{Backend, DispatchResponse, GenerationRequest};
use std::path::Path;
use tracing::info;

pub struct DispatchArgs {
    pub api_key: String,
    pub prompt: String,
    pub image_url: Option<String>,
}

pub fn run(config: Option<&Path>, args: DispatchArgs) -> Result<()> {
    let dispatcher = load_dispatcher(config)?;

    let request = GenerationRequest {
        api_key: args.api_key,
        prompt: args.prompt,
        image_url: args.image_url,
    };
    let receipt = dispatcher.dispatch(&request)?;
    let job_id = receipt.job.id;
    let backend = receipt.job.backend;
    print_json(&DispatchResponse::from(receipt))?;

    // The process owns the background task; let it finish before exiting
    if backend == Backend::CloudMesh {
        info!(job_id = %job_id, "waiting for cloud mesh generation");
        dispatcher.wait_idle();
        let job = dispatcher.job(&job_id)?;
        info!(
            job_id = %job_id,
            state = %job.state,
            result = job.result_locator.as_deref().unwrap_or("-"),
            "cloud mesh generation finished"
        );
    }

    Ok(())
}
