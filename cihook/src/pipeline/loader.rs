//! Loading pipeline scripts into an isolated Lua state.
//!
//! A pipeline script is a Lua chunk that returns a table. The only name the
//! runner looks for is `run`; everything else in the table is the author's
//! business.
//!
//! ```lua
//! return {
//!   run = function(toolkit, branch, message, flags)
//!     toolkit:pull()
//!     toolkit:exec("Running tests", "make test")
//!     return "tested " .. branch
//!   end,
//! }
//! ```
//!
//! Scripts run with the same privileges as the hook process. The toolkit is
//! the intended interface, but the Lua standard library (`os`, `io`) is left
//! loaded: pipeline authors are trusted committers of the repository.

use mlua::{Function, Lua, Table, Value};
use tracing::debug;

use crate::error::CihookError;

/// Chunk name used in Lua error messages and tracebacks.
const CHUNK_NAME: &str = "=cihook.lua";

/// Entry point every pipeline must export.
pub const RUN_FN: &str = "run";

/// An evaluated pipeline script.
pub struct PipelineModule {
    lua: Lua,
    exports: Table,
}

impl std::fmt::Debug for PipelineModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineModule").finish_non_exhaustive()
    }
}

impl PipelineModule {
    /// Evaluate `source` in a fresh Lua state.
    ///
    /// The bytes are handed to Lua unchanged; Lua strings are byte strings, so
    /// scripts need not be UTF-8. Syntax errors, errors raised while the chunk
    /// runs, and chunks that do not return a table all fail with
    /// [`CihookError::PipelineParse`].
    pub fn load(source: impl AsRef<[u8]>) -> Result<Self, CihookError> {
        let lua = Lua::new();
        let value: Value = lua
            .load(source.as_ref())
            .set_name(CHUNK_NAME)
            .eval()
            .map_err(|err| CihookError::PipelineParse {
                message: err.to_string(),
            })?;
        let exports = match value {
            Value::Table(table) => table,
            other => {
                return Err(CihookError::PipelineParse {
                    message: format!(
                        "script must return a table with a `{RUN_FN}` function, got {}",
                        other.type_name()
                    ),
                });
            }
        };
        debug!("pipeline script loaded");
        Ok(Self { lua, exports })
    }

    /// The exported `run` function, if the script defines one.
    pub fn run_fn(&self) -> Option<Function> {
        match self.exports.get::<Value>(RUN_FN) {
            Ok(Value::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}
