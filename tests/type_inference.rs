mod common;

use common::{create_test_backend, offset_of, open_doc};
use tower_lsp::lsp_types::Url;

fn atoms(type_string: &str) -> Vec<&str> {
    type_string.split('|').filter(|a| !a.is_empty()).collect()
}

#[tokio::test]
async fn cross_file_class_resolution_through_use_import() {
    let backend = create_test_backend();

    let uri_a = Url::parse("file:///a.php").unwrap();
    open_doc(&backend, &uri_a, "<?php namespace X; class A {}").await;

    let uri_b = Url::parse("file:///b.php").unwrap();
    let text_b = "<?php namespace Y; use X\\A; $v = new A();";
    open_doc(&backend, &uri_b, text_b).await;

    let inferred = backend.variable_type_at(uri_b.as_str(), text_b.len() as u32, "$v");
    assert_eq!(inferred, "\\X\\A");
}

#[tokio::test]
async fn branch_join_unions_both_arms() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///branch.php").unwrap();
    let text = concat!(
        "<?php\n",
        "if ($cond) {\n",
        "    $x = 1;\n",
        "} else {\n",
        "    $x = \"s\";\n",
        "}\n",
    );
    open_doc(&backend, &uri, text).await;

    let inferred = backend.variable_type_at(uri.as_str(), text.len() as u32, "$x");
    let atoms = atoms(&inferred);
    assert!(atoms.contains(&"int"), "expected int in {inferred:?}");
    assert!(atoms.contains(&"string"), "expected string in {inferred:?}");
    assert_eq!(atoms.len(), 2);
}

#[tokio::test]
async fn foreach_binds_element_type_from_var_annotation() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///each.php").unwrap();
    let text = concat!(
        "<?php\n",
        "/** @var int[] $xs */\n",
        "$xs = [];\n",
        "foreach ($xs as $v) {\n",
        "    $y = 1;\n",
        "}\n",
    );
    open_doc(&backend, &uri, text).await;

    let inferred = backend.variable_type_at(uri.as_str(), offset_of(text, "$y"), "$v");
    assert_eq!(inferred, "int");
}

#[tokio::test]
async fn foreach_key_variable_is_int_or_string() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///keys.php").unwrap();
    let text = concat!(
        "<?php\n",
        "/** @var string[] $map */\n",
        "$map = [];\n",
        "foreach ($map as $k => $v) {\n",
        "    $y = 1;\n",
        "}\n",
    );
    open_doc(&backend, &uri, text).await;

    let key = backend.variable_type_at(uri.as_str(), offset_of(text, "$y"), "$k");
    let atoms = atoms(&key);
    assert!(atoms.contains(&"int") && atoms.contains(&"string"), "got {key:?}");

    let value = backend.variable_type_at(uri.as_str(), offset_of(text, "$y"), "$v");
    assert_eq!(value, "string");
}

#[tokio::test]
async fn inherited_method_return_type_flows_through_call() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///inherit.php").unwrap();
    let text = concat!(
        "<?php\n",
        "class A {\n",
        "    public function m(): int {}\n",
        "}\n",
        "class B extends A {}\n",
        "$b = new B();\n",
        "$r = $b->m();\n",
    );
    open_doc(&backend, &uri, text).await;

    assert_eq!(backend.variable_type_at(uri.as_str(), text.len() as u32, "$b"), "\\B");
    assert_eq!(backend.variable_type_at(uri.as_str(), text.len() as u32, "$r"), "int");
}

#[tokio::test]
async fn catch_clause_binds_exception_union() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///catch.php").unwrap();
    let text = concat!(
        "<?php\n",
        "namespace App;\n",
        "class AError extends \\Exception {}\n",
        "class BError extends \\Exception {}\n",
        "try {\n",
        "    risky();\n",
        "} catch (AError|BError $e) {\n",
        "    $y = 1;\n",
        "}\n",
    );
    open_doc(&backend, &uri, text).await;

    let inferred = backend.variable_type_at(uri.as_str(), offset_of(text, "$y"), "$e");
    let atoms = atoms(&inferred);
    assert!(atoms.contains(&"\\App\\AError"), "got {inferred:?}");
    assert!(atoms.contains(&"\\App\\BError"), "got {inferred:?}");
}

#[tokio::test]
async fn instanceof_narrows_inside_then_branch() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///narrow.php").unwrap();
    let text = concat!(
        "<?php\n",
        "class Cat {}\n",
        "function pet($x) {\n",
        "    if ($x instanceof Cat) {\n",
        "        $y = 1;\n",
        "    }\n",
        "}\n",
    );
    open_doc(&backend, &uri, text).await;

    let inferred = backend.variable_type_at(uri.as_str(), offset_of(text, "$y"), "$x");
    assert_eq!(inferred, "\\Cat");
}

#[tokio::test]
async fn closure_sees_only_used_variables() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///closure.php").unwrap();
    let text = concat!(
        "<?php\n",
        "$kept = 1;\n",
        "$dropped = \"x\";\n",
        "$f = function () use ($kept) {\n",
        "    $y = 1;\n",
        "};\n",
    );
    open_doc(&backend, &uri, text).await;

    let offset = offset_of(text, "$y");
    assert_eq!(backend.variable_type_at(uri.as_str(), offset, "$kept"), "int");
    assert_eq!(backend.variable_type_at(uri.as_str(), offset, "$dropped"), "");
}

#[tokio::test]
async fn parameter_hints_bind_inside_method_bodies() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///params.php").unwrap();
    let text = concat!(
        "<?php\n",
        "namespace App;\n",
        "class Greeter {\n",
        "    public function greet(Greeter $other, string $name) {\n",
        "        $y = 1;\n",
        "    }\n",
        "}\n",
    );
    open_doc(&backend, &uri, text).await;

    let offset = offset_of(text, "$y");
    assert_eq!(
        backend.variable_type_at(uri.as_str(), offset, "$other"),
        "\\App\\Greeter"
    );
    assert_eq!(backend.variable_type_at(uri.as_str(), offset, "$name"), "string");
    assert_eq!(
        backend.variable_type_at(uri.as_str(), offset, "$this"),
        "\\App\\Greeter"
    );
}

#[tokio::test]
async fn list_destructuring_binds_element_types() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///destructure.php").unwrap();
    let text = concat!(
        "<?php\n",
        "/** @var string[] $row */\n",
        "$row = [];\n",
        "[$first, $second] = $row;\n",
    );
    open_doc(&backend, &uri, text).await;

    let end = text.len() as u32;
    assert_eq!(backend.variable_type_at(uri.as_str(), end, "$first"), "string");
    assert_eq!(backend.variable_type_at(uri.as_str(), end, "$second"), "string");
}

#[tokio::test]
async fn ternary_assignment_unions_both_arms() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///ternary.php").unwrap();
    let text = "<?php\n$x = $cond ? 1 : \"s\";\n";
    open_doc(&backend, &uri, text).await;

    let inferred = backend.variable_type_at(uri.as_str(), text.len() as u32, "$x");
    let atoms = atoms(&inferred);
    assert!(atoms.contains(&"int") && atoms.contains(&"string"), "got {inferred:?}");
}

#[tokio::test]
async fn known_function_and_subscript_types() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///known.php").unwrap();
    let text = concat!(
        "<?php\n",
        "$n = intval(\"7\");\n",
        "$parts = explode(\",\", \"a,b\");\n",
        "$one = $parts[0];\n",
    );
    open_doc(&backend, &uri, text).await;

    let end = text.len() as u32;
    assert_eq!(backend.variable_type_at(uri.as_str(), end, "$n"), "int");
    assert_eq!(backend.variable_type_at(uri.as_str(), end, "$parts"), "string[]");
    assert_eq!(backend.variable_type_at(uri.as_str(), end, "$one"), "string");
}

#[tokio::test]
async fn unconditional_reassignment_replaces_previous_type() {
    let backend = create_test_backend();

    let uri = Url::parse("file:///reassign.php").unwrap();
    let text = "<?php\n$x = 1;\n$x = \"now a string\";\n";
    open_doc(&backend, &uri, text).await;

    assert_eq!(
        backend.variable_type_at(uri.as_str(), text.len() as u32, "$x"),
        "string"
    );
}
