//! Morph natives exposed to scripts
//!
//! Every native validates its arguments through the morph system and never
//! throws: bad guids and unregistered morphs come back as `false`, `0`, or
//! a no-op. Guids arrive as plain JS numbers, so `-1` ("no entity") and other
//! values outside the guid range are accepted and resolve to nothing.

use std::cell::RefCell;
use std::rc::Rc;

use headmorph_core::{CharacterHost, MorphSystem, ScriptGuid, StreamingService};
use rquickjs::Function;

use crate::error::ScriptError;
use crate::runtime::ScriptRuntime;

pub const REGISTER_MORPH: &str = "RegisterCustomHeadMicroMorph";
pub const SET_MORPH_WEIGHT: &str = "SetPedCustomHeadMicroMorph";
pub const RESET_MORPH_WEIGHT: &str = "ResetPedCustomHeadMicroMorph";
pub const GET_MORPH_WEIGHT: &str = "GetPedCustomHeadMicroMorph";
pub const HAS_MORPH_WEIGHT: &str = "DoesPedUseCustomHeadMicroMorph";

/// Guid for a JS number, or `None` if it cannot name an entity.
fn script_guid(value: f64) -> Option<ScriptGuid> {
    let valid = value.fract() == 0.0 && (0.0..=f64::from(ScriptGuid::MAX)).contains(&value);
    if !valid {
        tracing::debug!(value, "script passed an invalid character handle");
        return None;
    }
    Some(value as ScriptGuid)
}

/// Shared handle the natives close over.
pub type SharedMorphSystem<S, H> = Rc<RefCell<MorphSystem<S, H>>>;

/// Bind the morph natives and `print` into the runtime's globals.
pub fn install_natives<S, H>(runtime: &ScriptRuntime, system: &SharedMorphSystem<S, H>) -> Result<(), ScriptError>
where
    S: StreamingService + 'static,
    H: CharacterHost + 'static,
{
    runtime.context.with(|ctx| {
        let globals = ctx.globals();

        let print_fn = Function::new(ctx.clone(), |msg: String| {
            tracing::info!(target: "headmorph::script", "{msg}");
        })?;
        globals.set("print", print_fn)?;

        let shared = Rc::clone(system);
        let register = Function::new(ctx.clone(), move |target_model: String, effect_name: String| {
            shared.borrow_mut().register_morph(&target_model, &effect_name)
        })?;
        globals.set(REGISTER_MORPH, register)?;

        let shared = Rc::clone(system);
        let set_weight = Function::new(ctx.clone(), move |guid: f64, effect_name: String, weight: f64| {
            if let Some(guid) = script_guid(guid) {
                shared
                    .borrow_mut()
                    .set_morph_weight(guid, &effect_name, weight as f32);
            }
        })?;
        globals.set(SET_MORPH_WEIGHT, set_weight)?;

        let shared = Rc::clone(system);
        let reset_weight = Function::new(ctx.clone(), move |guid: f64, effect_name: String| {
            if let Some(guid) = script_guid(guid) {
                shared.borrow_mut().reset_morph_weight(guid, &effect_name);
            }
        })?;
        globals.set(RESET_MORPH_WEIGHT, reset_weight)?;

        let shared = Rc::clone(system);
        let get_weight = Function::new(ctx.clone(), move |guid: f64, effect_name: String| {
            script_guid(guid)
                .map_or(0.0, |guid| f64::from(shared.borrow().get_morph_weight(guid, &effect_name)))
        })?;
        globals.set(GET_MORPH_WEIGHT, get_weight)?;

        let shared = Rc::clone(system);
        let has_weight = Function::new(ctx.clone(), move |guid: f64, effect_name: String| {
            script_guid(guid).is_some_and(|guid| shared.borrow().has_morph_weight(guid, &effect_name))
        })?;
        globals.set(HAS_MORPH_WEIGHT, has_weight)?;

        Ok::<_, rquickjs::Error>(())
    })?;

    tracing::debug!("morph natives installed");
    Ok(())
}
