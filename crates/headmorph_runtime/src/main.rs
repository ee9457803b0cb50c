//! Head Morph Runtime
//!
//! Boots the morph system against an in-memory streaming archive, runs a
//! morph script, and drives the blend events the engine would raise.
//!
//! Usage: `headmorph [script.js] [settings.json]`

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use glam::Vec3;
use headmorph_core::{
    CharacterPool, Drawable, LinearMorph, MemoryStreaming, MeshGeometry, MorphSettings, MorphSystem,
};
use headmorph_script::{install_natives, ScriptRuntime};
use tracing_subscriber::EnvFilter;

const MODEL: &str = "mp_m_freemode_01";

const DEMO_SCRIPT: &str = r#"
    RegisterCustomHeadMicroMorph("mp_m_freemode_01", "brow_up");
    RegisterCustomHeadMicroMorph("mp_m_freemode_01", "jaw_wide");
    if (RegisterCustomHeadMicroMorph("mp_m_freemode_01", "brow_up")) {
        print("duplicate registration accepted");
    }

    SetPedCustomHeadMicroMorph(PLAYER_PED, "brow_up", 0.5);
    SetPedCustomHeadMicroMorph(PLAYER_PED, "jaw_wide", -0.25);
    SetPedCustomHeadMicroMorph(COMPANION_PED, "jaw_wide", 1.0);
    SetPedCustomHeadMicroMorph(COMPANION_PED, "jaw_wide", 0.0004);

    print("player brow_up = " + GetPedCustomHeadMicroMorph(PLAYER_PED, "brow_up"));
    print("companion uses jaw_wide: " + DoesPedUseCustomHeadMicroMorph(COMPANION_PED, "jaw_wide"));
"#;

fn base_head() -> MeshGeometry {
    MeshGeometry::new(vec![
        Vec3::new(0.0, 1.6, 0.1),
        Vec3::new(-0.05, 1.55, 0.09),
        Vec3::new(0.05, 1.55, 0.09),
        Vec3::new(0.0, 1.45, 0.08),
    ])
}

fn demo_archive() -> MemoryStreaming<MeshGeometry> {
    let brow_up = vec![
        Vec3::new(0.0, 0.02, 0.0),
        Vec3::new(0.0, 0.01, 0.0),
        Vec3::new(0.0, 0.01, 0.0),
        Vec3::ZERO,
    ];
    let jaw_wide = vec![
        Vec3::ZERO,
        Vec3::new(-0.01, 0.0, 0.0),
        Vec3::new(0.01, 0.0, 0.0),
        Vec3::new(0.0, -0.02, 0.0),
    ];

    let mut archive = MemoryStreaming::new();
    archive.insert(
        &format!("{MODEL}/brow_up"),
        Drawable::single(MeshGeometry::new(brow_up)),
    );
    archive.insert(
        &format!("{MODEL}/jaw_wide"),
        Drawable::single(MeshGeometry::new(jaw_wide)),
    );
    archive
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Head Morph v{}", headmorph_core::VERSION);

    let mut args = std::env::args().skip(1);
    let script_path = args.next();
    let settings = match args.next() {
        Some(path) => MorphSettings::load(Path::new(&path))
            .with_context(|| format!("failed to load settings from {path}"))?,
        None => MorphSettings::default(),
    };
    tracing::info!(?settings, "settings loaded");

    let mut system = MorphSystem::new(settings, demo_archive(), CharacterPool::new());
    let player = system.host_mut().spawn_blended_character(MODEL);
    let companion = system.host_mut().spawn_blended_character(MODEL);
    system.on_blend_created(1, player);
    system.on_blend_created(2, companion);
    let system = Rc::new(RefCell::new(system));

    tracing::info!("Initializing script runtime...");
    let runtime = ScriptRuntime::new()?;
    install_natives(&runtime, &system)?;
    runtime.context.with(|ctx| {
        let globals = ctx.globals();
        globals.set("PLAYER_PED", player.script_guid())?;
        globals.set("COMPANION_PED", companion.script_guid())?;
        Ok::<_, headmorph_script::rquickjs::Error>(())
    })?;

    match &script_path {
        Some(path) => runtime
            .execute_file(Path::new(path))
            .with_context(|| format!("script {path} failed"))?,
        None => runtime.execute(DEMO_SCRIPT).context("demo script failed")?,
    }

    let mut morphs = system.borrow_mut();
    let sessions = morphs.take_reblend_requests();
    tracing::info!(?sessions, "re-blending characters");
    for session in sessions {
        let mut head = base_head();
        let report = morphs.handle_blend(session, &mut head, &mut LinearMorph);
        let displacement: f32 = head
            .positions
            .iter()
            .zip(base_head().positions)
            .map(|(morphed, base)| morphed.distance(base))
            .sum();
        tracing::info!(
            session,
            applied = report.applied,
            retried = report.retried,
            missing = report.missing,
            displacement,
            "head blend finished"
        );
    }

    let summary = morphs.reset_session();
    let resident: Vec<&str> = morphs.registry().streaming().resident_names().collect();
    tracing::info!(?summary, ?resident, "session torn down");

    Ok(())
}
