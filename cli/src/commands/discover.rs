use serde_json::{Value, json};

use crate::util::{exit_code_for, print_error, print_json, send_json, connection_error};

/// Print the OpenAPI document, or a compact `METHOD path  summary` list.
pub async fn run(api_url: &str, endpoints_only: bool, raw: bool) -> i32 {
    let (status, doc) = match send_json(
        api_url,
        reqwest::Method::GET,
        "/api-doc/openapi.json",
        None,
        None,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => return connection_error(&err),
    };

    if exit_code_for(status) != 0 {
        print_error(&doc);
        return exit_code_for(status);
    }

    if endpoints_only {
        print_json(&json!({ "endpoints": endpoints(&doc) }), raw);
    } else {
        print_json(&doc, raw);
    }
    0
}

fn endpoints(doc: &Value) -> Vec<Value> {
    let mut endpoints = Vec::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return endpoints;
    };
    for (path, methods) in paths {
        let Some(methods) = methods.as_object() else {
            continue;
        };
        for (method, details) in methods {
            if !["get", "post", "put", "delete", "patch"].contains(&method.as_str()) {
                continue;
            }
            endpoints.push(json!({
                "method": method.to_uppercase(),
                "path": path,
                "summary": details.get("summary").and_then(Value::as_str).unwrap_or(""),
            }));
        }
    }
    endpoints
}
