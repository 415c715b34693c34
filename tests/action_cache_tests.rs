mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::Method;
use smallvec::{smallvec, SmallVec};
use treeroute::actions::{
    ActionKind, ActionResolver, ActionResolverChain, DataSourceResolver, ResolvedAction,
};
use treeroute::router::{RouteNode, RouteTree};

use common::park_registry;

fn default_chain() -> ActionResolverChain {
    ActionResolverChain::new(vec![Arc::new(DataSourceResolver)])
}

fn critters_collection(tree: &RouteTree) -> Arc<RouteNode> {
    let id = tree.match_children(tree.root(), "critters")[0];
    tree.node(id)
}

#[test]
fn repeated_resolution_returns_the_same_cached_action() {
    let tree = RouteTree::new(park_registry());
    let chain = default_chain();
    let route = critters_collection(&tree);

    let first = chain.resolve(&route, &Method::GET).expect("claimed");
    let second = chain.resolve(&route, &Method::GET).expect("claimed");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.kind, ActionKind::QueryCollection);
}

#[test]
fn negative_results_are_cached_too() {
    let tree = RouteTree::new(park_registry());
    let chain = default_chain();
    let route = critters_collection(&tree);

    assert!(chain.resolve(&route, &Method::DELETE).is_none());
    let cached = chain.cached_len();
    assert!(chain.resolve(&route, &Method::DELETE).is_none());
    assert_eq!(chain.cached_len(), cached);
}

#[test]
fn methods_cache_independently() {
    let tree = RouteTree::new(park_registry());
    let chain = default_chain();
    let route = critters_collection(&tree);

    let get = chain.resolve(&route, &Method::GET).expect("claimed");
    let post = chain.resolve(&route, &Method::POST).expect("claimed");
    assert_eq!(get.kind, ActionKind::QueryCollection);
    assert_eq!(post.kind, ActionKind::CreateResource);
    assert_eq!(chain.cached_len(), 2);
}

struct CountingResolver {
    calls: Arc<AtomicUsize>,
}

impl ActionResolver for CountingResolver {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn resolve(&self, route: &RouteNode, method: &Method) -> SmallVec<[ResolvedAction; 1]> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        smallvec![ResolvedAction {
            kind: ActionKind::QueryCollection,
            route: route.id,
            method: method.clone(),
            handler: None,
            resolved_by: self.name(),
        }]
    }
}

#[test]
fn concurrent_first_access_computes_once() {
    let tree = Arc::new(RouteTree::new(park_registry()));
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = Arc::new(ActionResolverChain::new(vec![Arc::new(CountingResolver {
        calls: Arc::clone(&calls),
    })]));
    let route = critters_collection(&tree);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let chain = Arc::clone(&chain);
        let route = Arc::clone(&route);
        handles.push(std::thread::spawn(move || {
            chain.resolve(&route, &Method::GET).expect("claimed")
        }));
    }
    for handle in handles {
        handle.join().expect("thread");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(chain.cached_len(), 1);
}
