//! Chained calls: `root.child().grandchild()` in stubbing and verification.

mod common;

use spyglass::prelude::*;
use spyglass::MockKind;

use common::{assert_ok, assert_verification_failed, ctx, Repo, Root};

#[test]
fn test_chain_stubbing_creates_child_mock() {
    let ctx = ctx();
    let root = Root::new(&ctx);

    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(5)
        .expect("answer");

    assert_eq!(root.child().expect("child").grandchild().expect("grandchild"), 5);

    let first = root.child().expect("child");
    let second = root.child().expect("child");
    assert_eq!(first.object(), second.object());
    assert_eq!(first.object().class(), "Child");

    let child_stub = ctx.stub(first.object()).expect("child stub");
    assert_eq!(child_stub.parent(), Some(root.object().id()));
    assert_eq!(child_stub.kind(), MockKind::Strict);
    assert_eq!(
        ctx.stub(root.object()).expect("root stub").children(),
        vec![first.object().id()]
    );
}

#[test]
fn test_restubbing_a_chain_reuses_the_child() {
    let ctx = ctx();
    let root = Root::new(&ctx);

    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(5)
        .expect("answer");
    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(6)
        .expect("answer");

    assert_eq!(root.child().expect("child").grandchild().expect("grandchild"), 6);
    assert_eq!(ctx.stub(root.object()).expect("root").entries().len(), 1);
    let child = root.child().expect("child");
    assert_eq!(ctx.stub(child.object()).expect("child").entries().len(), 2);
}

#[test]
fn test_chains_with_different_arguments_get_different_children() {
    let ctx = ctx();
    let root = Root::new(&ctx);

    ctx.every(|| root.named_child("a")?.grandchild())
        .expect("record")
        .returns(1)
        .expect("answer");
    ctx.every(|| root.named_child("b")?.grandchild())
        .expect("record")
        .returns(2)
        .expect("answer");

    let a = root.named_child("a").expect("a");
    let b = root.named_child("b").expect("b");
    assert_ne!(a.object(), b.object());
    assert_eq!(a.grandchild().expect("a"), 1);
    assert_eq!(b.grandchild().expect("b"), 2);
    assert!(root.named_child("c").is_err());
}

#[test]
fn test_stubbing_the_link_itself() {
    let ctx = ctx();
    let root = Root::new(&ctx);

    // The last call of a chain gets the answer, so this stubs `child()` only.
    let replacement = ctx.mock("Child");
    ctx.every(|| root.child())
        .expect("record")
        .returns(replacement.clone())
        .expect("answer");
    assert_eq!(root.child().expect("child").object(), &replacement);

    // Chains through the stubbed link reach the user-supplied mock.
    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(3)
        .expect("answer");
    assert_eq!(
        ctx.stub(&replacement).expect("replacement").entries().len(),
        1
    );
    assert_eq!(root.child().expect("child").grandchild().expect("grandchild"), 3);
}

#[test]
fn test_verifying_a_chain() {
    let ctx = ctx();
    let root = Root::new(&ctx);
    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(5)
        .expect("answer");

    root.child().expect("child").grandchild().expect("grandchild");

    assert_ok(verify(&ctx, || root.child()?.grandchild()), "chain called");
    assert_verification_failed(verify_count(&ctx, 2, || root.child()?.grandchild()), "twice");
    assert_ok(verify_count(&ctx, 1, || root.child()), "link called once");
}

#[test]
fn test_verifying_a_chain_that_was_never_built() {
    let ctx = ctx();
    let root = Root::relaxed(&ctx);

    assert_ok(verify_never(&ctx, || root.child()?.grandchild()), "no chain yet");
    let report = assert_verification_failed(verify(&ctx, || root.child()?.grandchild()), "missing");
    assert!(report.actual.is_empty());
}

#[test]
fn test_relaxed_chain_memoizes_children() {
    let ctx = ctx();
    let root = Root::relaxed(&ctx);

    let child = root.child().expect("child");
    assert_eq!(child.grandchild().expect("default"), 0);
    assert_eq!(root.child().expect("again").object(), child.object());
    assert_eq!(
        ctx.stub(child.object()).expect("child").kind(),
        MockKind::Relaxed
    );

    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(9)
        .expect("answer");
    assert_eq!(child.grandchild().expect("stubbed"), 9);
    assert!(ctx.unnecessary_stubs(root.object()).expect("unused").is_empty());
}

#[test]
fn test_chain_through_generic_return() {
    let ctx = ctx();
    let repo = Repo::new(&ctx);

    ctx.every(|| repo.find_child(1)?.grandchild())
        .expect("record")
        .returns(7)
        .expect("answer");

    let child = repo.find_child(1).expect("child");
    assert_eq!(child.object().class(), "Child");
    assert_eq!(child.grandchild().expect("grandchild"), 7);
    assert!(repo.find_child(2).is_err());
}

#[test]
fn test_releasing_root_releases_children() {
    let ctx = ctx();
    let root = Root::new(&ctx);
    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(5)
        .expect("answer");
    let child = root.child().expect("child");

    ctx.release(root.object()).expect("release");
    assert!(matches!(
        child.grandchild(),
        Err(MockError::UnknownMock { .. })
    ));
}

#[test]
fn test_clearing_child_mocks() {
    let ctx = ctx();
    let root = Root::new(&ctx);
    ctx.every(|| root.child()?.grandchild())
        .expect("record")
        .returns(5)
        .expect("answer");
    let child = root.child().expect("child");

    ctx.clear(
        root.object(),
        ClearOptions {
            answers: false,
            recorded_calls: false,
            child_mocks: true,
        },
    )
    .expect("clear children");
    assert!(ctx.stub(child.object()).is_err());
}
