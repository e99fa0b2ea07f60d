use cambium::{component, fragment, tag, Builder, Class, ConfigurationError, Error, Kind, Patch, Registry, TreeNode, Value};

mod harness_;
use harness_::{operations, Harness};

fn list(keys: &[&str]) -> TreeNode {
	tag("ul").children(keys.iter().map(|&key| tag("li").key(key).text(key))).build()
}

fn page(title: &str) -> TreeNode {
	tag("main")
		.attr("id", "page")
		.child(tag("h1").text(title))
		.child(list(&["a", "b"]))
		.child(fragment(["x", "y"]))
		.build()
}

#[test]
fn identical_commit_is_a_no_op() {
	let mut h = Harness::new(Registry::new());
	let patches = h.commit(page("Hello")).unwrap();
	assert!(!patches.is_empty());
	assert_eq!(h.markup(), r#"<main id="page"><h1>Hello</h1><ul><li>a</li><li>b</li></ul>xy</main>"#);

	// A structurally equal copy, not the same allocation.
	assert_eq!(h.commit(page("Hello")).unwrap(), vec![]);
	assert_eq!(h.markup(), r#"<main id="page"><h1>Hello</h1><ul><li>a</li><li>b</li></ul>xy</main>"#);
}

#[test]
fn keyed_reorder_only_moves() {
	let mut h = Harness::new(Registry::new());
	h.commit(list(&["a", "b", "c"])).unwrap();
	let ul = h.children()[0];
	let before = h.renderer.surface().children(ul);

	let patches = h.commit(list(&["c", "a", "b"])).unwrap();
	assert!(!patches.is_empty());
	assert!(operations(&patches).iter().all(|&operation| operation == "move"), "{:?}", patches);
	assert_eq!(h.renderer.surface().children(ul), vec![before[2], before[0], before[1]]);
	assert_eq!(h.markup(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
}

#[test]
fn keyed_reversal_only_moves() {
	let mut h = Harness::new(Registry::new());
	h.commit(list(&["a", "b", "c", "d"])).unwrap();
	let ul = h.children()[0];
	let before = h.renderer.surface().children(ul);

	let patches = h.commit(list(&["d", "c", "b", "a"])).unwrap();
	assert_eq!(operations(&patches), vec!["move"; 3]);
	let mut reversed = before;
	reversed.reverse();
	assert_eq!(h.renderer.surface().children(ul), reversed);
}

#[test]
fn keyed_insert_and_remove() {
	let mut h = Harness::new(Registry::new());
	h.commit(list(&["a", "b", "c"])).unwrap();
	let ul = h.children()[0];
	let before = h.renderer.surface().children(ul);

	let patches = h.commit(list(&["a", "n", "c"])).unwrap();
	assert_eq!(operations(&patches), vec!["remove", "create", "attach", "create_text", "attach"]);
	let after = h.renderer.surface().children(ul);
	assert_eq!(after[0], before[0]);
	assert_eq!(after[2], before[2]);
	assert!(!h.renderer.surface().contains(before[1]));
	assert_eq!(h.markup(), "<ul><li>a</li><li>n</li><li>c</li></ul>");
}

#[test]
fn tag_swap_recreates() {
	let mut h = Harness::new(Registry::new());
	h.commit(tag("div").attr("class", "x").build()).unwrap();
	let div = h.children()[0];

	let patches = h.commit(tag("span").attr("class", "x").build()).unwrap();
	assert_eq!(operations(&patches), vec!["remove", "create", "attach"]);
	assert!(!h.renderer.surface().contains(div));
	assert_eq!(h.markup(), r#"<span class="x"></span>"#);
}

#[test]
fn tag_swap_among_siblings_recreates_in_place() {
	let mut h = Harness::new(Registry::new());
	h.commit(tag("div").child(tag("a")).child(tag("b")).child(tag("c")).build()).unwrap();

	let patches = h.commit(tag("div").child(tag("a")).child(tag("i")).child(tag("c")).build()).unwrap();
	assert_eq!(operations(&patches), vec!["remove", "create", "attach"]);
	assert!(matches!(patches[2], Patch::Attach { index: 1, .. }));
	assert_eq!(h.markup(), "<div><a></a><i></i><c></c></div>");
}

#[test]
fn unkeyed_children_match_by_their_own_order() {
	let mut h = Harness::new(Registry::new());
	let before_tree = tag("ul")
		.child(tag("li").key("a").text("A"))
		.child(tag("p").text("first"))
		.child(tag("li").key("b").text("B"))
		.child(tag("p").text("second"))
		.build();
	h.commit(before_tree).unwrap();
	let ul = h.children()[0];
	let before = h.renderer.surface().children(ul);

	let after_tree = tag("ul")
		.child(tag("p").text("first!"))
		.child(tag("li").key("b").text("B"))
		.child(tag("li").key("a").text("A"))
		.child(tag("p").text("second"))
		.build();
	let patches = h.commit(after_tree).unwrap();
	let operations = operations(&patches);
	assert!(!operations.contains(&"create") && !operations.contains(&"remove"), "{:?}", operations);
	assert_eq!(operations.iter().filter(|&&operation| operation == "set_text").count(), 1);
	assert_eq!(h.renderer.surface().children(ul), vec![before[1], before[2], before[0], before[3]]);
	assert_eq!(h.markup(), "<ul><p>first!</p><li>B</li><li>A</li><p>second</p></ul>");
}

#[test]
fn attributes_are_set_then_removed() {
	let mut h = Harness::new(Registry::new());
	h.commit(tag("a").attr("href", "/x").attr("title", "t").build()).unwrap();

	let patches = h.commit(tag("a").attr("href", "/y").attr("rel", "next").build()).unwrap();
	assert_eq!(patches.len(), 3, "{:?}", patches);
	assert!(matches!(&patches[0], Patch::SetAttribute { name, value, .. } if &**name == "href" && *value == Value::from("/y")));
	assert!(matches!(&patches[1], Patch::SetAttribute { name, .. } if &**name == "rel"));
	assert!(matches!(&patches[2], Patch::RemoveAttribute { name, .. } if &**name == "title"));
	assert_eq!(h.markup(), r#"<a href="/y" rel="next"></a>"#);
}

#[test]
fn key_is_not_an_attribute() {
	let mut h = Harness::new(Registry::new());
	let patches = h.commit(tag("li").key("k").attr("id", 1).build()).unwrap();
	assert!(matches!(&patches[0], Patch::Create { attributes, .. } if !attributes.contains_key("key")));
	assert_eq!(h.markup(), r#"<li id="1"></li>"#);
}

#[test]
fn fragments_emit_no_patches_of_their_own() {
	let mut h = Harness::new(Registry::new());
	h.commit(tag("div").child(fragment(["a"])).child("c").build()).unwrap();
	assert_eq!(h.markup(), "<div>ac</div>");

	let patches = h.commit(tag("div").child(fragment(["a", "b"])).child("c").build()).unwrap();
	assert_eq!(operations(&patches), vec!["create_text", "attach"]);
	assert!(matches!(patches[1], Patch::Attach { index: 1, .. }));
	assert_eq!(h.markup(), "<div>abc</div>");

	let patches = h.commit(tag("div").child(fragment(Vec::<&str>::new())).child("c").build()).unwrap();
	assert_eq!(operations(&patches), vec!["remove", "remove"]);
	assert_eq!(h.markup(), "<div>c</div>");
}

#[test]
fn keyed_fragments_move_as_a_unit() {
	let mut h = Harness::new(Registry::new());
	let tree = |order: [&str; 2]| {
		tag("div")
			.children(order.iter().map(|&key| Builder::new(Kind::Fragment).key(key).children([format!("{}1", key), format!("{}2", key)])))
			.build()
	};
	h.commit(tree(["a", "b"])).unwrap();
	assert_eq!(h.markup(), "<div>a1a2b1b2</div>");

	let patches = h.commit(tree(["b", "a"])).unwrap();
	assert_eq!(operations(&patches), vec!["move", "move"]);
	assert_eq!(h.markup(), "<div>b1b2a1a2</div>");
}

#[test]
fn clearing_the_root_removes_everything() {
	let mut h = Harness::new(Registry::new());
	h.commit(page("Bye")).unwrap();

	let patches = h.clear().unwrap();
	assert_eq!(operations(&patches), vec!["remove"]);
	assert_eq!(h.markup(), "");
	assert_eq!(h.renderer.surface().live_count(), 1);

	assert_eq!(h.clear().unwrap(), vec![]);
}

#[test]
fn duplicate_keys_fail_before_any_patch() {
	let mut h = Harness::new(Registry::new());
	let error = h.commit(list(&["a", "b", "a"])).unwrap_err();
	assert!(matches!(error, Error::Configuration(ConfigurationError::DuplicateKey { ref key }) if key.as_str() == "a"));
	assert_eq!(h.renderer.surface().live_count(), 1);
}

#[test]
fn unknown_components_are_configuration_errors() {
	let mut h = Harness::new(Registry::new());
	let error = h.commit(component("Missing").build()).unwrap_err();
	assert!(matches!(error, Error::Configuration(ConfigurationError::UnknownComponent(ref name)) if &**name == "Missing"));
}

#[test]
fn unknown_components_fail_before_anything_is_applied() {
	let mut h = Harness::new(Registry::new());
	let error = h.commit(tag("div").child(tag("span")).child(component("Missing")).build()).unwrap_err();
	assert!(matches!(error, Error::Configuration(ConfigurationError::UnknownComponent(_))));
	assert_eq!(h.markup(), "");

	h.commit(tag("div").child(tag("span")).build()).unwrap();
	assert_eq!(h.markup(), "<div><span></span></div>");
	h.clear().unwrap();
	assert_eq!(h.markup(), "");
}

#[test]
fn failures_in_render_output_roll_back_the_first_commit() {
	let registry = Registry::new().with(Class::new("Broken").render(|_| tag("b").child(component("Missing")).build()));
	let mut h = Harness::new(registry);

	let error = h.commit(tag("div").child(tag("span")).child(component("Broken")).build()).unwrap_err();
	assert!(matches!(error, Error::Configuration(ConfigurationError::UnknownComponent(ref name)) if &**name == "Missing"));
	assert_eq!(h.markup(), "");
	assert!(h.children().is_empty());
	assert!(h.renderer.instances_named("Broken").is_empty());
	// Only the root is left.
	assert_eq!(h.renderer.surface().live_count(), 1);

	h.commit(tag("div").child(tag("span")).build()).unwrap();
	assert_eq!(h.markup(), "<div><span></span></div>");
	h.clear().unwrap();
	assert_eq!(h.markup(), "");
}

#[test]
fn failed_diffs_clear_the_root() {
	let registry = Registry::new().with(Class::new("Broken").render(|_| component("Missing").build()));
	let mut h = Harness::new(registry);
	h.commit(page("one")).unwrap();

	let broken = tag("main").attr("id", "page").child(tag("h1").text("two")).child(component("Broken")).build();
	assert!(h.commit(broken).is_err());
	assert_eq!(h.markup(), "");
	assert!(h.clear().unwrap().is_empty());

	h.commit(page("three")).unwrap();
	assert_eq!(h.children().len(), 1);
	assert!(h.markup().starts_with("<main id=\"page\"><h1>three</h1>"));
}

#[test]
fn patch_sequences_are_deterministic() {
	let trees = [page("one"), list(&["c", "b", "a"]), page("two"), list(&["b", "x", "c"])];
	let run = || {
		let mut h = Harness::new(Registry::new());
		trees.iter().map(|tree| h.commit(tree.clone()).unwrap()).collect::<Vec<_>>()
	};
	assert_eq!(run(), run());
}
