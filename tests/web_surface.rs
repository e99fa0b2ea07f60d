#![cfg(all(feature = "web", target_arch = "wasm32"))]

use cambium::{component, map, tag, Class, Registry, Renderer, Value, WebSurface};
use futures::executor::LocalPool;
use std::sync::Once;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlBodyElement, HtmlElement};

wasm_bindgen_test_configure!(run_in_browser);

static LOG_INITIALIZED: Once = Once::new();

fn body() -> HtmlBodyElement {
	LOG_INITIALIZED.call_once(tracing_wasm::set_as_global_default);
	window().unwrap().document().unwrap().body().unwrap().dyn_into().unwrap()
}

fn counter() -> Class {
	Class::new("Counter")
		.initial_state(|_| map([("count", 0)]))
		.render(|cx| {
			tag("button")
				.attr("id", "test-button")
				.attr("disabled", false)
				.attr("onclick", cx.callback("increment"))
				.text(cx.get("count").map(ToString::to_string).unwrap_or_default())
				.build()
		})
		.on_action(|cx, _, _| {
			let count = cx.latest_state().get("count").and_then(Value::as_f64).unwrap_or(0.0);
			cx.set_state(map([("count", count + 1.0)]))?;
			Ok(())
		})
}

#[wasm_bindgen_test]
fn click() {
	let body = body();
	let document = window().unwrap().document().unwrap();
	let pool = LocalPool::new();
	let mut surface = WebSurface::new(document.clone());
	let root = surface.root(body.clone().into());
	let mut renderer = Renderer::new(surface, Registry::new().with(counter()), pool.spawner());

	renderer.commit(Some(component("Counter").build()), &root).unwrap();
	let button: HtmlElement = document.get_element_by_id("test-button").unwrap().dyn_into().unwrap();
	assert_eq!(button.text_content().as_deref(), Some("0"));
	assert!(!button.has_attribute("disabled"));
	assert!(!button.has_attribute("onclick"));

	button.click();
	let events = renderer.surface_mut().take_events();
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].1.type_(), "click");
	for (callback, _) in events {
		renderer.dispatch(&callback, &Value::Null).unwrap();
	}
	assert_eq!(button.text_content().as_deref(), Some("1"));

	renderer.commit(None, &root).unwrap();
	assert!(document.get_element_by_id("test-button").is_none());
	// Removal already freed the listener.
	assert_eq!(renderer.surface_mut().collect_listeners(), 0);
	assert!(renderer.surface_mut().take_events().is_empty());
}

#[wasm_bindgen_test]
fn bindings_of_one_callback_share_a_listener() {
	let body = body();
	let document = window().unwrap().document().unwrap();
	let pool = LocalPool::new();
	let mut surface = WebSurface::new(document.clone());
	let root = surface.root(body.into());
	let twins = Class::new("Twins").render(|cx| {
		let callback = cx.callback("press");
		tag("div")
			.child(tag("button").attr("onclick", callback.clone()))
			.child(tag("button").attr("onmousedown", callback))
			.build()
	});
	let mut renderer = Renderer::new(surface, Registry::new().with(twins), pool.spawner());

	renderer.commit(Some(component("Twins").build()), &root).unwrap();
	assert_eq!(renderer.surface().listener_count(), 1);

	renderer.commit(None, &root).unwrap();
	assert_eq!(renderer.surface().listener_count(), 0);
}
