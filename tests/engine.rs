use std::path::PathBuf;
use std::sync::Arc;
use templet::{
    filter_fn, Argument, Context, Engine, EngineConfig, Error, FileSystemLoader, InMemoryLoader,
    PluginVersion, StaticResolver, TagLibrary, Value,
};

fn constant(text: &'static str) -> TagLibrary {
    TagLibrary::new().filter(
        "foo",
        filter_fn(Argument::None, move |_, _, _| Ok(Value::from(text))),
    )
}

fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("templet-{label}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn later_library_shadows_earlier() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.register_library(&constant("first"));
    engine.register_library(&constant("second"));
    let template = engine.new_template("{{ x|foo }}", "t").unwrap();
    assert_eq!(template.render(&mut Context::new()).unwrap(), "second");

    engine.register_library(&constant("third"));
    let template = engine.new_template("{{ x|foo }}", "t").unwrap();
    assert_eq!(template.render(&mut Context::new()).unwrap(), "third");
}

#[test]
fn library_search_descends_minor_versions() {
    let mut engine = Engine::new(EngineConfig::default().with_version(1, 4).with_min_plugin_version(1));
    engine.add_resolver(
        StaticResolver::new()
            .with_library("lib", 0, |_| constant("v0"))
            .with_library("lib", 2, |v: PluginVersion| {
                assert_eq!(v, PluginVersion::new(1, 2));
                constant("v2")
            }),
    );
    assert!(engine.use_library("lib"));
    let template = engine.new_template("{{ x|foo }}", "t").unwrap();
    assert_eq!(template.render(&mut Context::new()).unwrap(), "v2");
}

#[test]
fn library_below_floor_is_not_found() {
    let mut engine = Engine::new(EngineConfig::default().with_version(1, 4).with_min_plugin_version(1));
    engine.add_resolver(StaticResolver::new().with_library("old", 0, |_| constant("v0")));
    assert!(engine.load_library("old").is_none());
    assert!(!engine.use_library("old"));

    let err = engine.new_template("{{ x|foo }}", "t").unwrap_err();
    assert!(err.is_syntax());
}

#[test]
fn loaded_libraries_are_cached() {
    let mut engine = Engine::default();
    let a = engine.load_library("defaulttags").unwrap();
    let b = engine.load_library("defaulttags").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.tag_names().any(|n| n == "with"));
}

#[test]
fn default_library_list_is_per_engine() {
    let mut engine = Engine::default();
    engine.remove_default_library("defaultfilters");
    engine.add_default_library("does-not-exist");
    assert_eq!(
        engine.default_libraries(),
        ["defaulttags", "loadertags", "does-not-exist"]
    );
    engine.load_default_libraries();

    assert!(engine.registry().has_tag("if"));
    assert!(!engine.registry().has_filter("upper"));
    assert!(engine.new_template("{{ x|upper }}", "t").is_err());

    let other = Engine::with_defaults();
    assert!(other.registry().has_filter("upper"));
}

#[test]
fn plugin_directories_gate_resolution() {
    let root = scratch_dir("plugins");
    std::fs::create_dir_all(root.join("1.1")).unwrap();
    std::fs::write(root.join("1.1").join("extras.plugin"), "").unwrap();

    let mut engine = Engine::new(EngineConfig::default().with_version(1, 3));
    engine.add_plugin("extras", |v: PluginVersion| constant(if v.minor == 1 { "one" } else { "other" }));
    assert!(engine.load_library("extras").is_none());

    engine.set_plugin_dirs(vec![root.clone()]);
    assert!(engine.use_library("extras"));
    let template = engine.new_template("{{ x|foo }}", "t").unwrap();
    assert_eq!(template.render(&mut Context::new()).unwrap(), "one");

    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn loaders_are_consulted_in_order() {
    let mut engine = Engine::with_defaults();
    engine.add_template_loader(InMemoryLoader::new().with_template("a", "first {{ x }}"));
    engine.add_template_loader(
        InMemoryLoader::new()
            .with_template("a", "second")
            .with_template("b", "only in second"),
    );

    let mut ctx = Context::new();
    ctx.insert("x", 1);
    let a = engine.load_by_name("a").unwrap().unwrap();
    assert_eq!(a.name(), "a");
    assert_eq!(a.render(&mut ctx).unwrap(), "first 1");
    let b = engine.load_by_name("b").unwrap().unwrap();
    assert_eq!(b.render(&mut ctx).unwrap(), "only in second");
    assert!(engine.load_by_name("missing").unwrap().is_none());
}

#[test]
fn loader_syntax_errors_propagate() {
    let mut engine = Engine::with_defaults();
    engine.add_template_loader(InMemoryLoader::new().with_template("bad", "{% bogus %}"));
    assert!(engine.load_by_name("bad").unwrap_err().is_syntax());
}

#[test]
fn missing_mutable_template_is_an_error() {
    let engine = Engine::with_defaults();
    let err = engine.load_mutable_by_name("nowhere").unwrap_err();
    assert!(matches!(err, Error::TemplateNotFound { .. }));
    assert!(err.is_syntax());
}

#[test]
fn mutable_template_content_is_shared() {
    let mut engine = Engine::with_defaults();
    engine.add_template_loader(InMemoryLoader::new().with_template("page", "v1"));
    let page = engine.load_mutable_by_name("page").unwrap();
    let held_elsewhere = page.clone();

    engine.set_template_content(&page, "v2 {{ n }}").unwrap();
    let mut ctx = Context::new();
    ctx.insert("n", 7);
    assert!(held_elsewhere.same_identity(&page));
    assert_eq!(held_elsewhere.render(&mut ctx).unwrap(), "v2 7");

    assert!(engine.set_template_content(&page, "{% if %}").is_err());
    assert_eq!(held_elsewhere.render(&mut ctx).unwrap(), "v2 7");
    assert_eq!(page.name(), "page");
}

#[test]
fn file_system_loader_and_media_uri() {
    let dir = scratch_dir("fsloader");
    std::fs::write(dir.join("hello.txt"), "Hello {{ who }}").unwrap();
    std::fs::write(dir.join("logo.png"), [0u8]).unwrap();

    let mut engine = Engine::with_defaults();
    engine.add_template_loader(InMemoryLoader::new());
    engine.add_template_loader(FileSystemLoader::new([dir.join("empty"), dir.clone()]));

    let mut ctx = Context::new();
    ctx.insert("who", "fs");
    let template = engine.load_by_name("hello.txt").unwrap().unwrap();
    assert_eq!(template.render(&mut ctx).unwrap(), "Hello fs");
    assert_eq!(
        engine.media_uri("logo.png"),
        Some(dir.join("logo.png").display().to_string())
    );
    assert_eq!(engine.media_uri("nope.png"), None);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn config_from_json() {
    let config = EngineConfig::from_json(
        r#"{"strict_variables": true, "trim_blocks": true, "plugin_dirs": ["/opt/plugins"]}"#,
    )
    .unwrap();
    assert!(config.strict_variables);
    assert!(config.autoescape);
    assert_eq!(config.plugin_dirs, vec![PathBuf::from("/opt/plugins")]);
    assert_eq!(config.default_libraries, EngineConfig::default().default_libraries);

    let mut engine = Engine::new(config);
    engine.load_default_libraries();
    assert!(engine.context().is_strict());
}

#[test]
fn templates_render_concurrently_with_separate_contexts() {
    let engine = Engine::with_defaults();
    let template = engine
        .new_template("{% for i in xs %}{{ i|add:n }}{% endfor %}", "shared")
        .unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4i64)
            .map(|n| {
                let template = &template;
                s.spawn(move || {
                    let mut ctx = Context::new();
                    ctx.insert("xs", vec![1, 2]);
                    ctx.insert("n", n);
                    template.render(&mut ctx).unwrap()
                })
            })
            .collect();
        let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outputs, vec!["12", "23", "34", "45"]);
    });
}

#[test]
fn include_renders_through_template_loaders() {
    let mut engine = Engine::with_defaults();
    engine.add_template_loader(
        InMemoryLoader::new()
            .with_template("header", "<h1>{{ title|upper }}</h1>")
            .with_template(
                "page",
                "{% include \"header\" %}{% for p in parts %}{% include p %}{% endfor %}",
            )
            .with_template("a", "A{{ forloop.counter }}")
            .with_template("b", "B"),
    );
    let engine = Arc::new(engine);
    let page = engine.load_by_name("page").unwrap().unwrap();

    let mut ctx = engine.shared_context();
    ctx.insert("title", "hi");
    ctx.insert("parts", vec!["a", "b"]);
    assert_eq!(page.render(&mut ctx).unwrap(), "<h1>HI</h1>A1B");
    assert_eq!(ctx.depth(), 1);
}

#[test]
fn include_of_unknown_template_fails() {
    let engine = Arc::new(Engine::with_defaults());
    let template = engine.new_template("x{% include \"nowhere\" %}", "t").unwrap();
    let err = template.render(&mut engine.shared_context()).unwrap_err();
    assert!(matches!(err, Error::TemplateNotFound { ref name } if name == "nowhere"));

    // No engine attached: nothing to load from.
    assert!(template.render(&mut Context::new()).is_err());
    assert!(engine.new_template("{% include %}", "t").unwrap_err().is_syntax());
}

#[test]
fn host_resolver_overrides_bundled_library() {
    let mut engine = Engine::default();
    engine.add_resolver(StaticResolver::new().with_any_version("defaultfilters", |_| {
        TagLibrary::new().filter(
            "upper",
            filter_fn(Argument::None, |_, _, _| Ok(Value::from("custom"))),
        )
    }));
    engine.load_default_libraries();

    let template = engine.new_template("{{ x|upper }}", "t").unwrap();
    assert_eq!(template.render(&mut Context::new()).unwrap(), "custom");
    assert!(!engine.registry().has_filter("join"));
    assert!(engine.registry().has_tag("include"));
}
