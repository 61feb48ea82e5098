//! Integration tests for the object tree: attach, detach, paths and
//! variables shared across threads.

mod common;

use common::{spawn, widget_runtime};
use oxikit::{Error, Object, VariableKind};
use std::thread;

// ============================================================================
// Tree Shape
// ============================================================================

#[test]
fn test_paths_and_lookup() {
    let rt = widget_runtime();
    let root = rt.root();
    let window = spawn(&rt, &root, "Object:Widget:Box", "window");
    let panel = spawn(&rt, &window, "Object:Widget:Box", "panel");
    let label = spawn(&rt, &panel, "Object:Widget:Label", "title");

    assert_eq!(root.path(), "/");
    assert_eq!(label.path(), "/window/panel/title");
    assert!(rt.find("/window/panel/title").unwrap().ptr_eq(&label));
    assert!(window.find("panel/title").unwrap().ptr_eq(&label));
    assert!(label.root().ptr_eq(&root));

    let err = rt.find("/window/missing/title").unwrap_err();
    assert!(matches!(err, Error::PathNotFound { segment, .. } if segment == "missing"));
}

#[test]
fn test_children_keep_insertion_order() {
    let rt = widget_runtime();
    let root = rt.root();
    for name in ["c", "a", "b"] {
        spawn(&rt, &root, "Object:Widget", name);
    }
    let names: Vec<_> = root.children().iter().map(Object::name).collect();
    assert_eq!(names, ["c", "a", "b"]);
}

#[test]
fn test_walk_is_depth_first() {
    let rt = widget_runtime();
    let root = rt.root();
    let a = spawn(&rt, &root, "Object:Widget", "a");
    spawn(&rt, &a, "Object:Widget", "a1");
    spawn(&rt, &root, "Object:Widget", "b");

    let mut seen = Vec::new();
    root.walk(&mut |object, depth| seen.push(format!("{depth}:{}", object.name())));
    assert_eq!(seen, ["0:root", "1:a", "2:a1", "1:b"]);
    assert_eq!(root.descendants().len(), 3);
}

#[test]
fn test_generated_names_are_unique() {
    let rt = widget_runtime();
    let root = rt.root();
    for _ in 0..5 {
        let name = root.generate_name("item");
        spawn(&rt, &root, "Object:Widget", &name);
    }
    assert_eq!(root.child_count(), 5);
}

// ============================================================================
// Attach / Detach
// ============================================================================

#[test]
fn test_attach_rejections() {
    let rt = widget_runtime();
    let root = rt.root();
    let a = spawn(&rt, &root, "Object:Widget", "a");
    let b = spawn(&rt, &a, "Object:Widget", "b");

    assert!(matches!(b.attach(&a), Err(Error::WouldCycle { .. })));
    assert!(matches!(root.attach(&b), Err(Error::AlreadyAttached(_))));

    let twin = rt.new_object("Object:Widget", "a").unwrap();
    assert!(matches!(root.attach(&twin), Err(Error::NameCollision { .. })));
    assert!(!twin.is_attached());
}

#[test]
fn test_take_child_moves_subtree() {
    let rt = widget_runtime();
    let root = rt.root();
    let left = spawn(&rt, &root, "Object:Widget", "left");
    let right = spawn(&rt, &root, "Object:Widget", "right");
    let item = spawn(&rt, &left, "Object:Widget", "item");
    spawn(&rt, &item, "Object:Widget", "leaf");

    let item = left.take_child(&item).unwrap();
    right.attach(&item).unwrap();
    assert_eq!(rt.find("/right/item/leaf").unwrap().path(), "/right/item/leaf");
    assert!(left.child("item").is_none());
}

#[test]
fn test_detach_destroys_subtree() {
    let rt = widget_runtime();
    let root = rt.root();
    let a = spawn(&rt, &root, "Object:Widget", "a");
    let b = spawn(&rt, &a, "Object:Widget", "b");
    b.set("width", 10_i32);

    root.detach(&a).unwrap();
    assert!(a.is_destroyed());
    assert!(b.is_destroyed());
    assert!(!b.has("width"));
    assert!(matches!(root.detach(&a), Err(Error::NotAChild { .. })));
}

#[test]
fn test_rename_checks_siblings() {
    let rt = widget_runtime();
    let root = rt.root();
    let a = spawn(&rt, &root, "Object:Widget", "a");
    spawn(&rt, &root, "Object:Widget", "b");

    assert!(matches!(a.rename("b"), Err(Error::NameCollision { .. })));
    assert!(matches!(a.rename("x/y"), Err(Error::InvalidName(_))));
    a.rename("c").unwrap();
    assert!(root.child("c").unwrap().ptr_eq(&a));
    assert!(root.child("a").is_none());
}

// ============================================================================
// Variables
// ============================================================================

#[test]
fn test_variable_kinds_enforced() {
    let rt = widget_runtime();
    let label = rt.new_object("Object:Widget:Label", "l").unwrap();
    label.set("text", "hello");

    assert_eq!(label.get::<String>("text").unwrap(), "hello");
    let err = label.get::<i32>("text").unwrap_err();
    assert!(matches!(
        err,
        Error::KindMismatch { expected: VariableKind::I32, found: VariableKind::String, .. }
    ));
    assert!(matches!(label.get::<i32>("missing"), Err(Error::VariableNotFound(_))));
    assert_eq!(label.get_or("missing", 7_i32), 7);
}

#[test]
fn test_binding_follows_object_lifetime() {
    let rt = widget_runtime();
    let root = rt.root();
    let gauge = spawn(&rt, &root, "Object:Widget", "gauge");
    gauge.set("level", 1.5_f64);

    let binding = gauge.bind("level").unwrap();
    binding.set(2.5_f64).unwrap();
    assert_eq!(gauge.get::<f64>("level").unwrap(), 2.5);
    assert!(binding.set(3_i32).is_err());

    root.detach(&gauge).unwrap();
    drop(gauge);
    assert!(binding.get().is_err());
}

#[test]
fn test_variables_shared_across_threads() {
    let rt = widget_runtime();
    let counter = spawn(&rt, &rt.root(), "Object:Widget", "counter");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let object = counter.clone();
            thread::spawn(move || {
                for j in 0..50 {
                    object.set(&format!("t{i}_{j}"), j as u32);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.keys().len(), 200);
}
