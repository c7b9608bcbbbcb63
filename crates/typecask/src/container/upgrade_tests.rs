use super::fixtures::CaskBuilder;
use super::*;

use typecask_format::preamble::VERSION_1;

#[test]
fn upgraded_version_and_boundary() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    b.add_integer_v1("int", true, 4, 0);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    assert_eq!(c.version(), FormatVersion::V1Upgraded);
    assert_eq!(c.version().id_boundary(), 0x7FFF);
    assert_eq!(c.type_count(), 1);
}

#[test]
fn integer_survives_upgrade() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0x0100_0020);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let view = c.type_at(TypeId(int)).unwrap();
    assert_eq!(view.kind(), Kind::Integer);
    assert_eq!(view.name(), "int");
    assert!(view.is_root());
    assert_eq!(view.size(), 4);
    assert_eq!(view.encoding(), Some(0x0100_0020));
}

#[test]
fn function_params_widen() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0);
    // Odd parameter count forces the v1 pad halfword.
    let f = b.add_function_v1("f", int as u16, &[int as u16, int as u16, int as u16]);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let view = c.type_at(TypeId(f)).unwrap();
    assert_eq!(view.kind(), Kind::Function);
    assert_eq!(view.vlen(), 3);
    assert_eq!(view.referenced_type(), Some(TypeId(int)));
    let params: Vec<u32> = view.params().unwrap().collect();
    assert_eq!(params, vec![int, int, int]);
}

#[test]
fn array_descriptor_widens() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0);
    let arr = b.add_array_v1(int as u16, int as u16, 10);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let info = c.type_at(TypeId(arr)).unwrap().array().unwrap();
    assert_eq!(info.elem_type, int);
    assert_eq!(info.index_type, int);
    assert_eq!(info.count, 10);
}

#[test]
fn enum_copies_through() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let e = b.add_enum_v1("color", &[("RED", 0), ("BLUE", -1)]);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let view = c.type_at(TypeId(e)).unwrap();
    let vals: Vec<(String, i32)> = view
        .enumerators()
        .unwrap()
        .map(|en| (view.string(en.name).to_owned(), en.value))
        .collect();
    assert_eq!(vals, vec![("RED".to_owned(), 0), ("BLUE".to_owned(), -1)]);
}

#[test]
fn narrow_struct_members_widen() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0);
    let s = b.add_composite_v1(
        Kind::Struct,
        "point",
        8,
        &[("x", int as u16, 0), ("y", int as u16, 32)],
    );
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let view = c.type_at(TypeId(s)).unwrap();
    assert_eq!(view.size(), 8);
    let members: Vec<(String, u32, u64)> = view
        .members()
        .unwrap()
        .map(|m| (view.string(m.name).to_owned(), m.type_id, m.offset))
        .collect();
    assert_eq!(
        members,
        vec![("x".to_owned(), int, 0), ("y".to_owned(), int, 32)]
    );
}

#[test]
fn wide_v1_struct_lands_narrow() {
    // 9000 is wide under the v1 threshold (8192) but narrow under the
    // current one.
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0);
    let s = b.add_composite_v1(Kind::Struct, "big", 9000, &[("tail", int as u16, 71_992)]);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let view = c.type_at(TypeId(s)).unwrap();
    assert_eq!(view.size(), 9000);
    let members: Vec<_> = view.members().unwrap().collect();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].type_id, int);
    assert_eq!(members[0].offset, 71_992);
}

#[test]
fn sections_around_types_survive() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0);
    b.add_label("snapshot", int);
    b.add_variable("counter", int);
    let image = b.build();
    let c = Container::open(&image).unwrap();

    let labels: Vec<_> = c.labels().collect();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].name, "snapshot");
    assert_eq!(labels[0].last_type, TypeId(int));

    let vars: Vec<_> = c.variables().collect();
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0].name, "counter");
    // The string section moved; names must still resolve after relocation.
    assert_eq!(
        c.lookup_type_by_name(Namespace::Other, "int"),
        Some(TypeId(int))
    );
}

#[test]
fn wrappers_and_forwards_pass_through() {
    let mut b = CaskBuilder::with_version(VERSION_1);
    let int = b.add_integer_v1("int", true, 4, 0);
    let ptr = b.add_pointer_v1(int as u16);
    let image = b.build();
    let c = Container::open(&image).unwrap();
    let view = c.type_at(TypeId(ptr)).unwrap();
    assert_eq!(view.kind(), Kind::Pointer);
    assert_eq!(view.referenced_type(), Some(TypeId(int)));
    assert_eq!(c.pointer_to(TypeId(int)), Some(TypeId(ptr)));
}
