//! The small built-in standard library consulted as the linker's last
//! resolution step (spec.md §4.3 step 7): `Rand, Time, SampleRate, Tempo,
//! EndSustain, EndRepeat`.

use crate::ast::StdlibId;
use crate::environment::Context;
use crate::evaluator::session::Session;
use crate::value::Value;
use rand::Rng;

/// `EndSustain`/`EndRepeat` are actions, not queries: they ask the
/// session to drop its suspended state on next `checkCompletion` rather
/// than returning a value. `invoke` returns the expression's value and
/// records the request on the session directly.
pub fn invoke(id: StdlibId, ctx: &dyn Context, session: &mut Session) -> Value {
    match id {
        StdlibId::Rand => Value::float(rand::thread_rng().gen_range(0.0..1.0)),
        StdlibId::Time => Value::int(std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)),
        StdlibId::SampleRate => Value::int(ctx.sample_rate() as i64),
        StdlibId::Tempo => Value::float(120.0),
        StdlibId::EndSustain => {
            if let Some(s) = session.sustain.as_mut() {
                s.active = false;
            }
            Value::Null
        }
        StdlibId::EndRepeat => {
            if let Some(r) = session.repeat.as_mut() {
                r.active = false;
            }
            Value::Null
        }
    }
}
