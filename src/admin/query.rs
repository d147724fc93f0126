//! Query-string translation.
//!
//! Turns `/dynamic?upstream=...&server=...&add` into an [`Operation`].
//! Flags are present-or-absent; their values are ignored.

use std::collections::HashMap;

use crate::upstream::op::{OpError, OpKind, Operation, Protocol};

pub fn build_operation(params: &HashMap<String, String>) -> Result<Operation, OpError> {
    let upstream = params
        .get("upstream")
        .ok_or_else(|| OpError::BadRequest("upstream required".into()))?;

    let flag = |name: &str| params.contains_key(name);

    let mut op = Operation::new(upstream.clone(), OpKind::List);
    op.server = params.get("server").cloned();
    op.peer = params.get("peer").cloned();
    op.backup = flag("backup");
    op.verbose = flag("verbose");
    op.up = flag("up");
    op.down = flag("down");
    op.ipv6 = flag("ipv6");
    op.protocol = if flag("stream") {
        Protocol::Stream
    } else {
        Protocol::Http
    };

    op.params.weight = number(params, "weight")?;
    op.params.max_fails = number(params, "max_fails")?;
    op.params.fail_timeout = number(params, "fail_timeout")?;
    op.params.max_conns = number(params, "max_conns")?;

    if op.params.weight == Some(0) {
        return Err(OpError::BadRequest("weight: must be at least 1".into()));
    }

    let add = flag("add");
    let remove = flag("remove");

    if !op.params.is_empty() || op.up || op.down {
        op.kind = OpKind::Update;
        op.verbose = true;
    }
    if add && remove {
        return Err(OpError::BadRequest(
            "add and remove at once are not allowed".into(),
        ));
    }
    if op.up && op.down {
        return Err(OpError::BadRequest(
            "down and up at once are not allowed".into(),
        ));
    }

    if add {
        op.kind = OpKind::Add;
    } else if remove {
        op.kind = OpKind::Remove;
    }
    if matches!(op.kind, OpKind::Add | OpKind::Remove) && op.server.is_none() {
        return Err(OpError::BadRequest("'server' argument required".into()));
    }

    Ok(op)
}

fn number(params: &HashMap<String, String>, name: &str) -> Result<Option<u32>, OpError> {
    params
        .get(name)
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| OpError::BadRequest(format!("{name}: not a number")))
        })
        .transpose()
}
