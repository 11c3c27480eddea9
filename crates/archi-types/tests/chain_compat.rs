//! Compatibility across a realistic type hierarchy.

use archi_types::{builtin, TypeDescriptor, TypeTable};

#[test]
fn resource_hierarchy_flows_upward_only() {
    let mut table = TypeTable::new();
    let resource = table.register("resource", None).unwrap();
    let buffer = table.register("buffer", Some(resource)).unwrap();
    let vertex_buffer = table.register("vertex_buffer", Some(buffer)).unwrap();
    let texture = table.register("texture", Some(resource)).unwrap();

    let want_resource = TypeDescriptor::Public(resource);
    let want_buffer = TypeDescriptor::Public(buffer);

    for id in [resource, buffer, vertex_buffer, texture] {
        assert!(table.compatible(&TypeDescriptor::Public(id), &want_resource));
    }
    assert!(table.compatible(&TypeDescriptor::Public(vertex_buffer), &want_buffer));
    assert!(!table.compatible(&TypeDescriptor::Public(texture), &want_buffer));
    assert!(!table.compatible(&want_resource, &want_buffer));

    // siblings never unify through a shared parent
    assert!(!table.compatible(
        &TypeDescriptor::Public(texture),
        &TypeDescriptor::Public(vertex_buffer)
    ));
}

#[test]
fn builtins_do_not_unify_with_each_other() {
    let table = TypeTable::new();
    let uint = TypeDescriptor::Public(builtin::UINT);
    let sint = TypeDescriptor::Public(builtin::SINT);
    assert!(table.compatible(&uint, &uint));
    assert!(!table.compatible(&uint, &sint));
    assert!(!table.compatible(&sint, &uint));
}
