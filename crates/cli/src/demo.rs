//! Targets exposed by `peerlink serve`.

use std::path::Path;

use peerlink_protocol::Invocation;
use peerlink_runtime::{Fault, HandlerResult, Registry};
use serde_json::{Value, json};

/// Registry served by the reference peer.
///
/// - `math.add`, `math.divide` (raises `ZeroDivisionError`), `math.echo`
/// - `peer.crash` drops the connection and ends the process
/// - `peer.crash_once PATH` crashes unless PATH exists, creating it first
/// - component `Divide Curve` (kwarg `count`), cluster `Offset`
/// - user object `Greeter`
pub fn registry() -> Registry {
	Registry::new()
		.function("math", "add", add)
		.function("math", "divide", divide)
		.function("math", "echo", |inv| Ok(json!({"args": inv.args, "kwargs": inv.kwargs})))
		.function("peer", "crash", |_| Err(Fault::Abort))
		.function("peer", "crash_once", crash_once)
		.component("Divide Curve", divide_curve)
		.cluster("Offset", |inv| {
			let distance = inv.kwargs.get("distance").and_then(Value::as_f64).unwrap_or(1.0);
			Ok(json!({"curve": "offset", "distance": distance}))
		})
		.user_object("Greeter", |inv| {
			let name = inv.args.first().and_then(Value::as_str).unwrap_or("world");
			Ok(json!(format!("hello {name}")))
		})
}

fn number(inv: &Invocation, index: usize) -> Result<f64, Fault> {
	inv.args.get(index).and_then(Value::as_f64).ok_or_else(|| {
		Fault::raise("TypeError", format!("argument {index} must be a number"))
	})
}

fn add(inv: &Invocation) -> HandlerResult {
	if inv.args.iter().all(Value::is_i64) {
		return Ok(json!(inv.args.iter().filter_map(Value::as_i64).sum::<i64>()));
	}
	let mut sum = 0.0;
	for index in 0..inv.args.len() {
		sum += number(inv, index)?;
	}
	Ok(json!(sum))
}

fn divide(inv: &Invocation) -> HandlerResult {
	let (a, b) = (number(inv, 0)?, number(inv, 1)?);
	if b == 0.0 {
		return Err(Fault::raise("ZeroDivisionError", "float division by zero"));
	}
	Ok(json!(a / b))
}

fn crash_once(inv: &Invocation) -> HandlerResult {
	let marker = inv
		.args
		.first()
		.and_then(Value::as_str)
		.ok_or_else(|| Fault::raise("TypeError", "crash_once needs a marker path"))?;
	if Path::new(marker).exists() {
		return Ok(json!("survived"));
	}
	std::fs::write(marker, b"crashed").map_err(|e| Fault::raise("OSError", e.to_string()))?;
	Err(Fault::Abort)
}

fn divide_curve(inv: &Invocation) -> HandlerResult {
	let count = inv.kwargs.get("count").and_then(Value::as_u64).unwrap_or(10);
	let length = inv.args.first().and_then(Value::as_f64).unwrap_or(1.0);
	let points: Vec<f64> = (0..=count).map(|i| length * i as f64 / count.max(1) as f64).collect();
	Ok(json!({"points": points, "count": count, "length": length}))
}
