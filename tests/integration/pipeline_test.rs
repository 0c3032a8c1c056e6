//! End-to-end tests: build the manifests, then load and dispatch at runtime.

mod helpers;

use std::sync::Arc;

use serde_json::{Value, json};

use plexus_manifest::{HookCategory, run_build};
use plexus_runtime::{HandlerCall, HandlerModule, HandlerOutcome, Runtime, SkipReason, StaticModuleLoader};

const HANDLER: &str = "export default async () => {}\n";
const PLUGIN: &str = "node_modules/@acme/greeter";

fn greeter_project() -> helpers::TestProject {
    let mut project = helpers::TestProject::new();
    project.add_plugin("@acme/greeter", Some(json!({ "greeting": "hi" })));

    project.write(&format!("{PLUGIN}/.plexus/build/routes/commands.toml"), "[key]\nstyle = \"filepath\"\nseparator = \" \"\n");
    project.write(&format!("{PLUGIN}/.plexus/build/routes/events.toml"), "multiple = true\n");
    project.write(&format!("{PLUGIN}/.plexus/build/commands/hello.js"), HANDLER);
    project.write(&format!("{PLUGIN}/.plexus/build/commands/wave.js"), HANDLER);
    project.write(&format!("{PLUGIN}/.plexus/build/events/ready.js"), HANDLER);
    project.write(&format!("{PLUGIN}/.plexus/build/events/_start.js"), HANDLER);
    project.write(&format!("{PLUGIN}/.plexus/build/hooks/init.js"), HANDLER);

    project.write("config/routes/middleware.toml", "");
    project.write("src/commands/hello.ts", HANDLER);
    project.write("src/commands/admin/ban.ts", HANDLER);
    project.write("src/events/ready.ts", HANDLER);
    project.write("src/middleware/audit.ts", HANDLER);
    project.write("src/hooks/init.js", HANDLER);
    project
}

fn returning(value: Value) -> HandlerModule {
    HandlerModule::from_fn(move |_| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

fn loader() -> Arc<StaticModuleLoader> {
    let loader = StaticModuleLoader::new();
    loader.register("src/commands/hello.ts", returning(json!("project hello")));
    loader.register("src/commands/admin/ban.ts", returning(json!("banned")));
    loader.register(".plexus/build/commands/hello.js", returning(json!("plugin hello")));
    loader.register(".plexus/build/commands/wave.js", returning(json!("wave")));
    loader.register(
        ".plexus/build/events/ready.js",
        HandlerModule::from_fn(|call: HandlerCall| async move { Ok(call.plugin_options.unwrap_or(Value::Null)) }),
    );
    loader.register(".plexus/build/events/_start.js", returning(json!("started")));
    loader.register("src/events/ready.ts", returning(json!("project ready")));
    loader.register(
        "src/middleware/audit.ts",
        HandlerModule::from_fn(|call: HandlerCall| async move {
            let key = call.args[0]["record"]["key"].as_str().unwrap_or_default().to_string();
            Ok(json!({ "abort": key == "admin ban" }))
        }),
    );
    Arc::new(loader)
}

#[tokio::test]
async fn test_rebuild_is_byte_identical() {
    let project = greeter_project();

    let first = run_build(&project.config).await.expect("first build");
    let manifest_bytes = std::fs::read(&first.manifest_path).expect("read manifest");
    let hooks_bytes = std::fs::read(&first.hooks_path).expect("read hooks");

    let second = run_build(&project.config).await.expect("second build");
    assert!(second.diff.is_empty());
    assert_eq!(std::fs::read(&second.manifest_path).expect("read manifest"), manifest_bytes);
    assert_eq!(std::fs::read(&second.hooks_path).expect("read hooks"), hooks_bytes);
}

#[tokio::test]
async fn test_build_composes_plugin_and_project() {
    let project = greeter_project();
    let summary = run_build(&project.config).await.expect("build");
    let manifest = &summary.manifest;

    assert_eq!(
        manifest.keys("acmeGreeter", "commands"),
        vec!["admin ban", "hello", "wave"]
    );
    let hello = &manifest
        .get("acmeGreeter", "commands", "hello")
        .expect("hello")
        .entries()[0];
    assert!(hello.path.ends_with("src/commands/hello.ts"));
    assert!(hello.plugin.is_none());
    let ban = &manifest
        .get("acmeGreeter", "commands", "admin ban")
        .expect("admin ban")
        .entries()[0];
    assert_eq!(ban.extra.parent.as_deref(), Some("admin"));

    assert_eq!(manifest.keys("acmeGreeter", "events"), vec!["_start", "ready"]);
    assert_eq!(manifest.keys("project", "middleware"), vec!["audit"]);

    let init = summary.hooks.get(HookCategory::Init);
    let ids: Vec<&str> = init.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["acmeGreeter:init", "project:init"]);
}

#[tokio::test]
async fn test_runtime_dispatches_built_manifest() {
    let project = greeter_project();
    run_build(&project.config).await.expect("build");

    let runtime = Runtime::load(&project.config, loader()).await.expect("load runtime");

    let ready = runtime.dispatch("acmeGreeter", "events", "ready", vec![]).await;
    assert_eq!(ready.values(), vec![&json!({ "greeting": "hi" }), &json!("project ready")]);

    let commands = runtime.controller("acmeGreeter", "commands");
    let hello = commands.execute("hello", vec![json!("world")]).await;
    assert_eq!(hello.values(), vec![&json!("project hello")]);
    assert!(commands.get("wave").await.is_some());

    let ban = commands.execute("admin ban", vec![]).await;
    assert_eq!(
        ban.handlers[0].outcome,
        HandlerOutcome::Skipped(SkipReason::Middleware { by: "audit".to_string() })
    );

    let started = runtime.start().await;
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].values(), vec![&json!("started")]);
}
