//! Reference preservation: shared identity and cyclic graphs.

use std::{cell::RefCell, rc::Rc};

use strata_core::{ByteBuffer, Serializer, SerializerConfig, reflect};

reflect! {
    #[derive(Debug, Default)]
    struct Node("test#Node") {
        value: i32,
        next: Option<Rc<RefCell<Node>>>,
    }
}

type SharedNode = Rc<RefCell<Node>>;

fn node(value: i32) -> SharedNode {
    Rc::new(RefCell::new(Node { value, next: None }))
}

#[test]
fn cyclic_graph_preserves_identity() {
    let a = node(1);
    let b = node(2);
    a.borrow_mut().next = Some(b.clone());
    b.borrow_mut().next = Some(a.clone());

    let engine = Serializer::new();
    let mut buf = ByteBuffer::new();
    engine.serialize(&a, &mut buf).expect("serialize");

    let mut result: SharedNode = node(0);
    engine.deserialize(&mut buf, &mut result).expect("deserialize");
    assert_eq!(buf.get_rpos(), buf.get_wpos());

    assert_eq!(result.borrow().value, 1);
    let second = result.borrow().next.clone().expect("a links to b");
    assert_eq!(second.borrow().value, 2);
    let third = second.borrow().next.clone().expect("b links back to a");
    // The cycle closes on the very object we deserialized.
    assert!(Rc::ptr_eq(&third, &result));
}

#[test]
fn shared_references_stay_shared() {
    let shared = node(5);
    let list = vec![shared.clone(), shared.clone(), shared];

    let engine = Serializer::new();
    let mut buf = ByteBuffer::new();
    engine.serialize(&list, &mut buf).expect("serialize");

    let mut result: Vec<SharedNode> = Vec::new();
    engine.deserialize(&mut buf, &mut result).expect("deserialize");

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].borrow().value, 5);
    assert!(Rc::ptr_eq(&result[0], &result[1]));
    assert!(Rc::ptr_eq(&result[1], &result[2]));

    // Mutating through one handle is visible through the others.
    result[0].borrow_mut().value = 6;
    assert_eq!(result[2].borrow().value, 6);
}

#[test]
fn disabled_preservation_duplicates_shared_objects() {
    let shared = node(5);
    let list = vec![shared.clone(), shared];

    let engine =
        Serializer::with_config(SerializerConfig::new().with_preserve_references(false));
    let mut buf = ByteBuffer::new();
    engine.serialize(&list, &mut buf).expect("serialize");

    let mut result: Vec<SharedNode> = Vec::new();
    engine.deserialize(&mut buf, &mut result).expect("deserialize");

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].borrow().value, 5);
    assert_eq!(result[1].borrow().value, 5);
    assert!(!Rc::ptr_eq(&result[0], &result[1]));
}

#[test]
fn discard_hook_sees_replaced_objects() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static DISCARDED: AtomicUsize = AtomicUsize::new(0);

    let engine = Serializer::with_config(SerializerConfig::new().with_discard_object(
        Box::new(|_| {
            DISCARDED.fetch_add(1, Ordering::SeqCst);
        }),
    ));
    let mut buf = ByteBuffer::new();
    engine.serialize(&node(1), &mut buf).expect("serialize");

    let mut target: SharedNode = node(0);
    engine.deserialize(&mut buf, &mut target).expect("deserialize");
    // The pre-existing target cell was replaced and offered for recycling.
    assert_eq!(DISCARDED.load(Ordering::SeqCst), 1);
    assert_eq!(target.borrow().value, 1);
}
