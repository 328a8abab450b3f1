use super::super::params::BatchParams;
use super::super::{DispatchResult, Dispatcher};
use serde_json::{json, Value};

/// Runs `ops` in order. Slot `i` of `results` holds `{result}` or `{error}` for `ops[i]`; a
/// failing op never stops the ones after it.
pub(in crate::dispatch) fn batch(
    dispatcher: &mut Dispatcher,
    params: BatchParams,
) -> DispatchResult<Value> {
    let total = params.ops.len();
    let mut failed = 0usize;
    let mut results = Vec::with_capacity(total);

    for (index, op) in params.ops.into_iter().enumerate() {
        match dispatcher.route(op, true) {
            Ok(result) => results.push(json!({ "result": result })),
            Err(err) => {
                log::debug!("Batch op {index} failed: {err}");
                failed += 1;
                results.push(json!({ "error": err.into_envelope() }));
            }
        }
    }

    Ok(json!({
        "count": total,
        "failed": failed,
        "results": results,
    }))
}
