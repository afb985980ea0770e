use std::cell::{Cell, RefCell};
use std::rc::Rc;
use strata::{Engine, EngineConfig, ListShapeDefinition, Record, Signal, Value, ViewKind};

const LAYOUT: &str = r#"
bindings {
    submit: Button
    people: List
}
types {
    Mode { compact: 1  expanded: 2 }
}
inputs {
    user { name: String  age: Number }
    mode: Mode
    users: Users
}
properties {
    gap: 8
    colors { primary: #3366ff }
}
functions {
    greet(name: String) { "Hello " + name }
}
layout {
    layer {
        linear {
            axis: .vertical
            spacing: gap
            padding { left: 8  right: 8 }
            label { text: greet(user.name)  color: colors.primary }
            label { text: mode == .compact ? "compact" : "expanded" }
            submit { title: "Go"  enabled: user.age >= 18 }
            people {
                items: users
                user { label { text: item.name } }
                newUser { label { text: "new" } }
            }
        }
    }
}
"#;

struct Fixture {
    engine: Engine,
    name: Signal,
    age: Signal,
    mode: Signal,
    users: Signal,
    presses: Rc<Cell<usize>>,
    selections: Rc<RefCell<Vec<(usize, Value)>>>,
}

fn fixture(config: EngineConfig) -> Fixture {
    let mut engine = Engine::with_config(config);
    engine
        .register_list(
            ListShapeDefinition::new("Users")
                .variant("user", [("id", "Number"), ("name", "String")])
                .variant("newUser", []),
        )
        .unwrap();
    let name = engine.register_input("user.name").unwrap();
    let age = engine.register_input("user.age").unwrap();
    let mode = engine.register_input("mode").unwrap();
    let users = engine.register_input("users").unwrap();

    let presses = Rc::new(Cell::new(0));
    let counter = presses.clone();
    engine
        .register_button("submit", move || counter.set(counter.get() + 1))
        .unwrap();
    let selections = Rc::new(RefCell::new(Vec::new()));
    let sink = selections.clone();
    engine
        .register_list_action("people", move |index, model| {
            sink.borrow_mut().push((index, model.clone()))
        })
        .unwrap();

    Fixture {
        engine,
        name,
        age,
        mode,
        users,
        presses,
        selections,
    }
}

fn user(id: f64, name: &str) -> Record {
    Record::new("user")
        .with("id", Value::Number(id))
        .with("name", Value::string(name))
}

fn list(records: Vec<Record>) -> Value {
    Value::List(records.into())
}

#[test]
fn builds_and_follows_inputs() {
    let fixture = fixture(EngineConfig::default());
    let layout = fixture.engine.build(LAYOUT).unwrap();

    let linear = &layout.layers[0].children[0];
    assert_eq!(linear.kind, ViewKind::Linear);
    assert_eq!(linear.parent, Some(layout.layers[0].id));
    assert_eq!(linear.value("axis"), Some(Value::Number(1.0)));
    assert_eq!(linear.value("spacing"), Some(Value::Number(8.0)));
    assert_eq!(linear.value("padding.right"), Some(Value::Number(8.0)));
    assert!(linear.property("padding.top").is_none());

    let greeting = &linear.children[0];
    assert_eq!(greeting.value("text"), None);
    fixture.name.emit(Value::string("Ada"));
    assert_eq!(greeting.value("text"), Some(Value::string("Hello Ada")));
    assert_eq!(greeting.property("color").unwrap().ty.name(), "Color");

    let mode_label = &linear.children[1];
    fixture.mode.emit(Value::Number(1.0));
    assert_eq!(mode_label.value("text"), Some(Value::string("compact")));
    fixture.mode.emit(Value::Number(7.0));
    assert_eq!(mode_label.value("text"), Some(Value::string("compact")));
    fixture.mode.emit(Value::Number(2.0));
    assert_eq!(mode_label.value("text"), Some(Value::string("expanded")));

    let submit = layout.find("submit").unwrap();
    assert_eq!(submit.kind, ViewKind::Button);
    fixture.age.emit(Value::Number(17.0));
    assert_eq!(submit.value("enabled"), Some(Value::Bool(false)));
    fixture.age.emit(Value::Number(30.0));
    assert_eq!(submit.value("enabled"), Some(Value::Bool(true)));
    assert!(submit.press());
    assert_eq!(fixture.presses.get(), 1);

    assert_eq!(layout.property("gap").unwrap().latest(), Some(Value::Number(8.0)));
}

#[test]
fn list_items_are_recycled_by_identity() {
    let fixture = fixture(EngineConfig::default());
    let layout = fixture.engine.build(LAYOUT).unwrap();
    let people = layout.find("people").unwrap().list.clone().unwrap();
    assert!(people.is_empty());

    fixture.users.emit(list(vec![user(1.0, "Ada"), user(2.0, "Bob"), Record::new("newUser")]));
    assert_eq!(people.len(), 3);
    let first = people.item_ids();

    fixture.users.emit(list(vec![user(2.0, "Bobby"), user(1.0, "Ada")]));
    let second = people.item_ids();
    assert_eq!(second, [first[1], first[0]]);
    assert_eq!(people.revision().latest(), Some(Value::Number(2.0)));

    let snapshots = people.snapshots();
    assert_eq!(
        snapshots[0].children[0].properties["text"],
        Some(Value::string("Bobby"))
    );
    assert_eq!(people.cache_stats("newUser"), Some((0, 1)));

    assert!(people.select(1));
    assert_eq!(
        fixture.selections.borrow().as_slice(),
        [(1, Value::Record(user(1.0, "Ada")))]
    );
}

#[test]
fn list_caches_stay_within_capacity() {
    let fixture = fixture(EngineConfig {
        list_cache_capacity: 2,
    });
    let layout = fixture.engine.build(LAYOUT).unwrap();
    let people = layout.find("people").unwrap().list.clone().unwrap();

    let records = (0..5).map(|id| user(id as f64, "x")).collect();
    fixture.users.emit(list(records));
    assert_eq!(people.len(), 5);
    fixture.users.emit(list(Vec::new()));
    assert_eq!(people.cache_stats("user"), Some((2, 0)));

    fixture.users.emit(list(vec![user(4.0, "back")]));
    assert_eq!(people.cache_stats("user"), Some((1, 0)));
}

#[test]
fn displayed_items_keep_their_views_beyond_cache_capacity() {
    let fixture = fixture(EngineConfig {
        list_cache_capacity: 2,
    });
    let layout = fixture.engine.build(LAYOUT).unwrap();
    let people = layout.find("people").unwrap().list.clone().unwrap();

    let records: Vec<Record> = (0..5).map(|id| user(id as f64, "x")).collect();
    fixture.users.emit(list(records.clone()));
    let before = people.item_ids();

    let mut grown = records;
    grown.push(user(5.0, "new"));
    fixture.users.emit(list(grown));

    let after = people.item_ids();
    assert_eq!(after.len(), 6);
    assert_eq!(after[..5], before[..]);
    assert!(!before.contains(&after[5]));
    assert_eq!(people.cache_stats("user"), Some((0, 0)));
}

#[test]
fn snapshots_serialize() {
    let fixture = fixture(EngineConfig::default());
    let layout = fixture.engine.build(LAYOUT).unwrap();
    fixture.users.emit(list(vec![user(1.0, "Ada")]));

    let snapshot = layout.snapshot();
    assert_eq!(snapshot[0].count(), 8);
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains(r#""kind":"linear""#), "{json}");
    assert!(json.contains(r#""binding":"submit""#), "{json}");
}

#[test]
fn overloads_pick_the_candidate_whose_arguments_link() {
    let engine = Engine::new();
    let layout = engine
        .build(
            r#"
            types {
                Mode { compact expanded }
                Side { leading trailing }
            }
            functions {
                pick(value: Mode) { "mode" }
                pick(value: Side) { "side" }
            }
            layout { layer {
                label { text: pick(.trailing) }
                label { text: pick(.expanded) }
            } }
            "#,
        )
        .unwrap();
    let labels = &layout.layers[0].children;
    assert_eq!(labels[0].value("text"), Some(Value::string("side")));
    assert_eq!(labels[1].value("text"), Some(Value::string("mode")));
}

#[test]
fn extra_arguments_find_no_function() {
    let error = Engine::new()
        .build(
            r#"
            functions { f(a: Number, b: Number) { a + b } }
            layout { layer { label { text: string(f(1, 2, "extra")) } } }
            "#,
        )
        .unwrap_err();
    assert!(error.message().contains("cannot find function"), "{error}");
    assert_eq!(error.line(), 3);
}

#[test]
fn builds_are_all_or_nothing() {
    let engine = Engine::new();
    for (code, message) in [
        ("layout { layer { label { text: \"unterminated } } }", "unterminated string"),
        ("layout { layer { label { text: 1 + } } }", ""),
        ("layout { layer { label { text: missing } } }", "unknown variable 'missing'"),
        ("layout { layer { label { alignment: .middle } } }", "enum TextAlignment has no case 'middle'"),
        ("layout { layer { list { items: 3 } } }", "list items must have a list type, found Number"),
    ] {
        let error = engine.build(code).unwrap_err();
        assert!(error.message().contains(message), "{code}: {error}");
    }
}

#[test]
fn untyped_inputs_need_a_declaration() {
    let mut engine = Engine::new();
    engine.register_input("title").unwrap();
    let error = engine
        .build("layout { layer { label { text: title } } }")
        .unwrap_err();
    assert_eq!(error.message(), "input 'title' has no declared type");

    let layout = engine
        .build("inputs { title: String } layout { layer { label { text: title } } }")
        .unwrap();
    engine.input("title").unwrap().emit(Value::string("Hi"));
    assert_eq!(layout.layers[0].children[0].value("text"), Some(Value::string("Hi")));
}
