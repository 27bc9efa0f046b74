//! Stack-frame interpreter with resumption (spec.md §4.4 "Evaluator").

pub mod errors;
pub mod eval;
pub mod frame;
pub mod session;
pub mod stdlib;

pub use errors::EvalError;
pub use eval::{advance, node_at, run};
pub use frame::{CallTarget, NodeAddress, PathStep, RootRef, StackFrame, WaitState};
pub use session::{RepeatState, Session, SustainState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExecContextTarget;
    use crate::compilation::Compilation;
    use crate::environment::Environment;
    use crate::environment::test_context::NullContext;
    use std::sync::Arc;

    fn install(env: &mut Environment, ctx: &dyn crate::environment::Context, id: &str, source: &str) {
        let unit = env.compile(id, source);
        let result = env.install(ctx, unit);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn e1_arithmetic_precedence() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        install(&mut env, &ctx, "e1", "1 + 2 * 3");

        let unit: Arc<Compilation> = env.unit("e1").unwrap().clone();
        let mut session = Session::new(1, unit, ExecContextTarget::Shell, RootRef::Body, Vec::new());
        run(&env, &ctx, &mut session);

        assert!(session.errors.is_empty(), "{:?}", session.errors);
        assert_eq!(session.result_value, Value::int(7));
    }

    #[test]
    fn e3_function_call() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        install(&mut env, &ctx, "e3", "function dbl(x) { x * 2 } dbl(5)");

        let unit = env.unit("e3").unwrap().clone();
        let mut session = Session::new(2, unit, ExecContextTarget::Shell, RootRef::Body, Vec::new());
        run(&env, &ctx, &mut session);

        assert!(session.errors.is_empty(), "{:?}", session.errors);
        assert_eq!(session.result_value, Value::int(10));
    }

    #[test]
    fn divide_by_zero_yields_zero() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        install(&mut env, &ctx, "dz", "1 / 0");

        let unit = env.unit("dz").unwrap().clone();
        let mut session = Session::new(3, unit, ExecContextTarget::Shell, RootRef::Body, Vec::new());
        run(&env, &ctx, &mut session);

        assert_eq!(session.result_value, Value::int(0));
    }

    #[test]
    fn e2_enum_keyword_equality() {
        let mut env = Environment::new();
        let ctx = NullContext::default().with_external("switchQuantize", Value::Enum { ordinal: 3, name: "loop".to_string() });
        install(&mut env, &ctx, "e2", "if switchQuantize == loop 42 else 0");

        let unit = env.unit("e2").unwrap().clone();
        let mut session = Session::new(5, unit, ExecContextTarget::Shell, RootRef::Body, Vec::new());
        run(&env, &ctx, &mut session);

        assert!(session.errors.is_empty(), "{:?}", session.errors);
        assert_eq!(session.result_value, Value::int(42));
    }

    #[test]
    fn unresolved_bare_symbol_is_its_own_name() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        install(&mut env, &ctx, "un", "someUnknownThing");

        let unit = env.unit("un").unwrap().clone();
        let mut session = Session::new(4, unit, ExecContextTarget::Shell, RootRef::Body, Vec::new());
        run(&env, &ctx, &mut session);

        assert_eq!(session.result_value, Value::string("someUnknownThing"));
    }
}
