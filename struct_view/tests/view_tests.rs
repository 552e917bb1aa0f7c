/* Zero-copy view tests over declared and file-loaded record layouts */

use std::sync::Arc;
use struct_layout::PrimitiveType::*;
use struct_layout::{
    LayoutError, LayoutFile, Primitive, RecordBuilder, RecordMetadata, TypeRegistry,
};
use struct_view::{serialize, RecordView, Value};

fn header() -> Arc<RecordMetadata> {
    RecordBuilder::new("Header")
        .array("magic", Char, 4)
        .field("count", Uint16)
        .array("end", Char, 4)
        .finish()
        .expect("header layout")
}

fn packet() -> Arc<RecordMetadata> {
    RecordBuilder::new("Packet")
        .field("len", Uint8)
        .counted_by("data", Uint16, "len")
        .field("crc", Uint32)
        .finish()
        .expect("packet layout")
}

#[test]
fn header_fields_land_at_packed_offsets() {
    let mut view = RecordView::alloc(header());
    assert_eq!(view.size().unwrap(), 10);

    view.set_text("magic", "RIFF").unwrap();
    view.set("count", 0x0203u16).unwrap();
    view.set_text("end", "END").unwrap();

    assert_eq!(view.as_bytes().unwrap(), b"RIFF\x03\x02END\0");
    assert_eq!(view.offset_of("end").unwrap(), 6);
    assert_eq!(view.text("magic").unwrap(), "RIFF");
    assert_eq!(view.text("end").unwrap(), "END");
    assert_eq!(view.get_as::<u16>("count").unwrap(), 0x0203);

    /* Copy out and back: same bytes */
    let value = view.to_value().unwrap();
    assert_eq!(value.get("magic").and_then(Value::as_text), Some("RIFF"));
    assert_eq!(serialize(&value).unwrap(), view.as_bytes().unwrap());

    assert!(matches!(
        view.set_text("magic", "TOOLONG"),
        Err(LayoutError::InvalidValue { .. })
    ));
}

#[test]
fn union_members_alias_the_same_bytes() {
    let word = RecordBuilder::new("Word")
        .union()
        .field("a", Uint32)
        .array("b", Uint8, 4)
        .finish()
        .unwrap();
    assert_eq!(word.static_size(), 4);

    let mut view = RecordView::alloc(word);
    view.set("a", 1u32).unwrap();
    let b: Vec<u8> = view
        .array("b")
        .unwrap()
        .to_vec()
        .unwrap()
        .into_iter()
        .map(u8::from_scalar)
        .collect();
    assert_eq!(b, vec![1, 0, 0, 0]);

    view.array_mut("b").unwrap().set(3, 0x80u8).unwrap();
    assert_eq!(view.get_as::<u32>("a").unwrap(), 0x8000_0001);
}

#[test]
fn counted_array_length_follows_its_counter() {
    let mut buf = vec![0u8; 32];
    let mut view = RecordView::new(packet(), &mut buf[..]).unwrap();

    view.set("len", 2u8).unwrap();
    assert_eq!(view.array("data").unwrap().len(), 2);
    assert_eq!(view.offset_of("crc").unwrap(), 5);
    view.set("crc", 0xAABB_CCDDu32).unwrap();

    /* Growing the counter moves crc and exposes its old bytes as data */
    view.set("len", 3u8).unwrap();
    let data = view.array("data").unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data.get_as::<u16>(2).unwrap(), 0xCCDD);
    assert_eq!(view.offset_of("crc").unwrap(), 7);
    assert_eq!(view.get_as::<u32>("crc").unwrap(), 0xAABB);
    assert_eq!(view.size().unwrap(), 11);
    assert_eq!(view.length_of("data").unwrap(), 3);

    assert!(matches!(
        view.array("data").unwrap().get(3),
        Err(LayoutError::OutOfBounds {
            index: 3,
            length: 3
        })
    ));

    drop(view);
    assert_eq!(buf[0], 3);
}

#[test]
fn counted_array_past_buffer_end_is_reported() {
    let bytes = [5u8, 0, 0, 0, 0];
    let view = RecordView::new(packet(), &bytes[..]).unwrap();
    assert!(matches!(
        view.array("data"),
        Err(LayoutError::BufferTooSmall { .. })
    ));
    assert!(matches!(
        RecordView::new(packet(), &bytes[..4]),
        Err(LayoutError::BufferTooSmall { .. })
    ));
}

#[test]
fn derived_record_shares_base_prefix() {
    let base = RecordBuilder::new("Base")
        .field("id", Uint32)
        .field("flags", Uint8)
        .finish()
        .unwrap();
    let derived = RecordBuilder::new("Derived")
        .extends(&base)
        .field("extra", Uint16)
        .finish()
        .unwrap();
    assert_eq!(derived.static_size(), 7);

    let mut view = RecordView::alloc(Arc::clone(&derived));
    view.set("id", 42u32).unwrap();
    view.set("flags", 1u8).unwrap();
    view.set("extra", 9u16).unwrap();
    assert_eq!(view.offset_of("extra").unwrap(), base.static_size());

    let as_base = RecordView::new(Arc::clone(&base), view.as_bytes().unwrap()).unwrap();
    assert_eq!(as_base.get_as::<u32>("id").unwrap(), 42);
    assert_eq!(as_base.size().unwrap(), 5);

    /* A derived instance may be stored where the base type is declared */
    let holder = RecordBuilder::new("Holder")
        .field("tag", Uint8)
        .field("item", &base)
        .finish()
        .unwrap();
    let mut outer = RecordView::alloc(holder);
    outer.set_record("item", &view).unwrap();
    assert_eq!(outer.as_bytes().unwrap().len(), 6);
    assert_eq!(outer.record("item").unwrap().get_as::<u32>("id").unwrap(), 42);

    outer.record_mut("item").unwrap().set("flags", 7u8).unwrap();
    assert_eq!(outer.as_bytes().unwrap()[5], 7);

    let unrelated = RecordView::alloc(
        RecordBuilder::new("Other")
            .field("id", Uint32)
            .finish()
            .unwrap(),
    );
    assert!(matches!(
        outer.set_record("item", &unrelated),
        Err(LayoutError::TypeMismatch { .. })
    ));
}

#[test]
fn record_arrays_index_into_the_parent_buffer() {
    let point = RecordBuilder::new("Point")
        .field("x", Int16)
        .field("y", Int16)
        .finish()
        .unwrap();
    let poly = RecordBuilder::new("Poly")
        .field("n", Uint8)
        .counted_by("pts", &point, "n")
        .finish()
        .unwrap();

    let mut view = RecordView::alloc(poly);
    view.set("n", 3u8).unwrap();
    assert_eq!(view.fit_buffer().unwrap(), 13);

    {
        let mut pts = view.records_mut("pts").unwrap();
        assert_eq!(pts.len(), 3);
        for i in 0..3 {
            let mut p = pts.get_mut(i).unwrap();
            p.set("x", i as i16 * 10).unwrap();
            p.set("y", -(i as i16)).unwrap();
        }
        assert!(matches!(
            pts.get_mut(3),
            Err(LayoutError::OutOfBounds {
                index: 3,
                length: 3
            })
        ));

        let mut lone = RecordView::alloc(Arc::clone(&point));
        lone.set("x", 99i16).unwrap();
        pts.set(0, &lone).unwrap();
    }

    let pts = view.records("pts").unwrap();
    assert_eq!(pts.get(0).unwrap().get_as::<i16>("x").unwrap(), 99);
    assert_eq!(pts.get(0).unwrap().get_as::<i16>("y").unwrap(), 0);
    assert_eq!(pts.get(2).unwrap().get_as::<i16>("x").unwrap(), 20);
    assert_eq!(pts.get(2).unwrap().get_as::<i16>("y").unwrap(), -2);
    assert_eq!(pts.get(1).unwrap().byte_offset(), 5);
}

#[test]
fn dynamic_record_elements_are_walked() {
    let blob = RecordBuilder::new("Blob")
        .field("len", Uint8)
        .counted_by("bytes", Uint8, "len")
        .finish()
        .unwrap();
    let list = RecordBuilder::new("List")
        .field("count", Uint8)
        .counted_by("blobs", &blob, "count")
        .finish()
        .unwrap();

    let bytes = [2u8, 1, 9, 3, 1, 2, 3];
    let view = RecordView::new(list, &bytes[..]).unwrap();
    assert_eq!(view.size().unwrap(), 7);

    let blobs = view.records("blobs").unwrap();
    let second = blobs.get(1).unwrap();
    assert_eq!(second.byte_offset(), 3);
    assert_eq!(second.bytes("bytes").unwrap(), &[1u8, 2, 3]);
    assert_eq!(blobs.get(0).unwrap().size().unwrap(), 2);
}

#[test]
fn dynamic_elements_are_replaced_only_in_place() {
    let blob = RecordBuilder::new("Blob")
        .field("len", Uint8)
        .counted_by("bytes", Uint8, "len")
        .finish()
        .unwrap();
    let list = RecordBuilder::new("List")
        .field("count", Uint8)
        .counted_by("blobs", &blob, "count")
        .finish()
        .unwrap();

    let mut bytes = [2u8, 1, 9, 1, 7];
    let mut view = RecordView::new(list, &mut bytes[..]).unwrap();

    let longer = RecordView::new(Arc::clone(&blob), &[3u8, 1, 2, 3][..]).unwrap();
    let same = RecordView::new(Arc::clone(&blob), &[1u8, 4][..]).unwrap();
    {
        let mut blobs = view.records_mut("blobs").unwrap();
        assert!(matches!(
            blobs.set(0, &longer),
            Err(LayoutError::InvalidValue { .. })
        ));
        blobs.set(0, &same).unwrap();
    }
    drop(view);
    assert_eq!(bytes, [2, 1, 4, 1, 7]);
}

#[test]
fn same_named_records_are_distinct_types() {
    let p = RecordBuilder::new("P").field("x", Uint8).finish().unwrap();
    let other = RecordBuilder::new("P")
        .field("y", Uint64)
        .field("z", Uint64)
        .finish()
        .unwrap();
    let holder = RecordBuilder::new("Holder")
        .field("p", &p)
        .finish()
        .unwrap();

    let mut view = RecordView::alloc(holder);
    let impostor = RecordView::alloc(other);
    assert!(matches!(
        view.set_record("p", &impostor),
        Err(LayoutError::TypeMismatch { .. })
    ));
    assert_eq!(view.as_bytes().unwrap(), &[0u8]);
}

#[test]
fn big_endian_records_store_high_byte_first() {
    let be = RecordBuilder::new("Be")
        .big_endian()
        .field("v", Uint32)
        .array("w", Uint16, 2)
        .finish()
        .unwrap();
    let mut view = RecordView::alloc(be);
    view.set("v", 0x0102_0304u32).unwrap();
    view.array_mut("w").unwrap().set(1, 0x0506u16).unwrap();
    assert_eq!(view.as_bytes().unwrap(), &[1u8, 2, 3, 4, 0, 0, 5, 6]);
}

#[test]
fn views_over_file_declared_layouts() {
    let yaml = r#"
records:
  - name: Item
    members:
      - { name: id, type: u16 }
  - name: Header
    big-endian: true
    members:
      - { name: magic, type: char, length: 4 }
      - { name: count, type: uint16 }
      - { name: items, type: Item, length: count }
"#;
    let file = LayoutFile::from_yaml_str(yaml).unwrap();
    let registry = TypeRegistry::try_from(file).unwrap();
    let header = registry.record("Header").unwrap();

    let bytes = b"ABCD\x00\x02\x01\x00\x02\x00";
    let view = RecordView::new(Arc::clone(header), &bytes[..]).unwrap();
    assert_eq!(view.text("magic").unwrap(), "ABCD");
    assert_eq!(view.get_as::<u16>("count").unwrap(), 2);

    let items = view.records("items").unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items.get(1).unwrap().get_as::<u16>("id").unwrap(), 2);
    assert_eq!(view.size().unwrap(), bytes.len());
}
