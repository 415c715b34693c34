mod common;

use std::sync::Arc;

use treeroute::router::{RouteKind, RouteTree};
use treeroute::schema::{MethodSet, TypeRef};

use common::park_registry;

fn park_tree() -> RouteTree {
    RouteTree::new(park_registry())
}

#[test]
fn root_exposes_one_collection_per_registered_root() {
    let tree = park_tree();
    let children = tree.children(tree.root());
    assert_eq!(children.ordered().len(), 1);
    let collection = tree.node(children.ordered()[0]);
    assert_eq!(collection.match_value().map(AsRef::as_ref), Some("critters"));
    assert_eq!(collection.result_type, TypeRef::Collection(Arc::from("critter")));
    assert_eq!(collection.allowed_methods, MethodSet::collection_default());
}

#[test]
fn collection_segment_matches_case_insensitively() {
    let tree = park_tree();
    assert_eq!(tree.match_children(tree.root(), "CRITTERS").len(), 1);
    assert_eq!(tree.match_children(tree.root(), "Critters").len(), 1);
    assert!(tree.match_children(tree.root(), "weapons").is_empty());
}

#[test]
fn item_child_matches_only_parseable_keys() {
    let tree = park_tree();
    let collection = tree.match_children(tree.root(), "critters")[0];
    assert_eq!(tree.match_children(collection, "42").len(), 1);
    assert!(tree.match_children(collection, "bjorn").is_empty());
    assert!(tree.match_children(collection, "").is_empty());
}

#[test]
fn sibling_subtype_properties_share_one_literal_slot() {
    let tree = park_tree();
    let collection = tree.match_children(tree.root(), "critters")[0];
    let item = tree.match_children(collection, "42")[0];

    // bear and wolf both declare "weapons"; both candidates surface
    let weapons = tree.match_children(item, "weapons");
    assert_eq!(weapons.len(), 2);
    for id in &weapons {
        let node = tree.node(*id);
        let RouteKind::Property { declaring_type, .. } = &node.kind else {
            panic!("expected a property node");
        };
        assert!(matches!(declaring_type.as_ref(), "bear" | "wolf"));
        assert_eq!(node.input_type, TypeRef::Resource(Arc::clone(declaring_type)));
    }
}

#[test]
fn collection_property_admits_the_item_collection_methods() {
    let tree = park_tree();
    let collection = tree.match_children(tree.root(), "critters")[0];
    let item = tree.match_children(collection, "42")[0];

    for id in tree.match_children(item, "weapons") {
        let node = tree.node(id);
        assert!(node.allowed_methods.contains(&http::Method::GET));
        assert!(node.allowed_methods.contains(&http::Method::POST));
    }
    // plain value properties stay read-only
    let name = tree.match_children(item, "name");
    assert!(!tree.node(name[0]).allowed_methods.contains(&http::Method::POST));
}

#[test]
fn redeclared_property_yields_one_candidate_per_declaring_type() {
    let tree = park_tree();
    let collection = tree.match_children(tree.root(), "critters")[0];
    let item = tree.match_children(collection, "42")[0];

    // critter and bear both declare "diet"
    let diet = tree.match_children(item, "diet");
    assert_eq!(diet.len(), 2);
}

#[test]
fn handler_segment_appears_under_item_route() {
    let tree = park_tree();
    let collection = tree.match_children(tree.root(), "critters")[0];
    let item = tree.match_children(collection, "42")[0];

    let growl = tree.match_children(item, "growl");
    assert_eq!(growl.len(), 1);
    let node = tree.node(growl[0]);
    assert!(matches!(node.kind, RouteKind::Custom { .. }));
    assert!(node.allowed_methods.contains(&http::Method::POST));
    assert!(!node.allowed_methods.contains(&http::Method::GET));
}

#[test]
fn cyclic_graph_expands_lazily_without_blowup() {
    let tree = park_tree();
    let collection = tree.match_children(tree.root(), "critters")[0];
    // critters/{id}/weapons/{id}/owner/weapons/... nests without bound
    let mut item = tree.match_children(collection, "42")[0];
    for _ in 0..4 {
        let weapons = tree.match_children(item, "weapons");
        assert!(!weapons.is_empty());
        let weapon = tree.match_children(weapons[0], "1");
        assert_eq!(weapon.len(), 1);
        let owner = tree.match_children(weapon[0], "owner");
        assert_eq!(owner.len(), 1);
        item = owner[0];
    }
}

#[test]
fn children_are_computed_once_and_memoized() {
    let tree = park_tree();
    let first = tree.children(tree.root());
    let second = tree.children(tree.root());
    assert!(Arc::ptr_eq(&first, &second));
}
