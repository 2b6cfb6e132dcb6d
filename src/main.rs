//! Scenesets - scene-set lifecycle demo
//!
//! Loads a scene-set definition and runs it through one full lifecycle
//! against the in-process scene host.

use std::sync::Arc;

use scenesets::config::AppConfig;
use scenesets::{DestructionChannel, SceneHost, SceneSet, SceneSetDefinition};

async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let definition = SceneSetDefinition::load(&config.scenes.definition)?;
    log::info!(
        "Loaded definition '{}' with {} scenes ({} singletons)",
        definition.name,
        definition.scenes.len(),
        definition.singleton_count()
    );

    let channel = DestructionChannel::global();
    let host = Arc::new(SceneHost::with_config(channel.clone(), config.host.to_host_config()));
    let set = SceneSet::from_definition(&definition, host.clone(), channel)?;

    set.initialize().await?;

    for key in definition.template_keys() {
        for _ in 0..config.scenes.instances_per_template {
            let handle = set.load(key).await?;
            log::info!("Instantiated '{}' as {:?}", key, handle);
        }
    }
    log::info!(
        "{} live template instances, {} scenes hosted",
        set.live_instance_count(),
        host.handles().len()
    );

    set.teardown().await?;
    log::info!("Scenes still hosted after teardown: {}", host.handles().len());

    set.close().await?;
    Ok(())
}

fn main() {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    // Initialize logging; RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.debug.log_level.as_str()),
    )
    .init();
    log::info!("Starting scenesets");

    if let Err(e) = pollster::block_on(run(&config)) {
        log::error!("Scene set run failed: {}", e);
        std::process::exit(1);
    }
}
