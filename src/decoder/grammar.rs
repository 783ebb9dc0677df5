//! Startup loading of named models into a decoder's working set

use std::path::PathBuf;
use tracing::{info, warn};

use super::Decoder;
use crate::error::DecoderError;

/// Uniform weight given to every loaded grammar
pub const GRAMMAR_WEIGHT: f32 = 1.0;

/// Load every file in `paths` into the decoder's working set, select the
/// first one that loaded and install the set.
///
/// Files that fail to load are skipped. Entries are named by the path as
/// given, which is also what clients send to select them. Returns the
/// number of loaded entries.
pub fn load_working_set<D: Decoder>(
    decoder: &mut D,
    paths: &[PathBuf],
) -> Result<usize, DecoderError> {
    info!("Initializing grammars");

    let mut first = None;
    for path in paths {
        let name = path.to_string_lossy().into_owned();
        info!("Loading grammar '{}'", name);

        match decoder.read_model(path) {
            Ok(model) => {
                info!("Adding {} to working set", name);
                decoder.working_set_mut().add(model, &name, GRAMMAR_WEIGHT);
                first.get_or_insert(name);
            }
            Err(e) => warn!("Unable to load grammar '{}': {}", name, e),
        }
    }

    let first = first.ok_or(DecoderError::EmptyWorkingSet)?;
    decoder.working_set_mut().select(&first)?;
    decoder.update_working_set()?;

    info!("Active grammar: {}", first);
    Ok(decoder.working_set().len())
}
