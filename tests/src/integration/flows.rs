//! # Integration Test Flows
//!
//! End-to-end dispatch scenarios against the fixture registry, driven
//! straight through the engine:
//!
//! 1. **Create**: a valid product request yields a Result document.
//! 2. **Validation**: a missing required field names that field.
//! 3. **Procedure**: shape requests describe instead of execute.
//! 4. **Chaining**: outputs feed nested dispatchings, first error stops.
//! 5. **Authorization**: licence checks gate protected transactions.

#[cfg(test)]
mod tests {
    use crate::fixtures::{engine, form, VALID_LICENCE};
    use dispatch_core::{DispatchContext, Document, DocumentType};
    use serde_json::json;

    fn shirt() -> Document {
        Document::new("product", "create").with_form(form(json!({
            "name": "Shirt",
            "slug": "shirt",
            "counter": 1
        })))
    }

    // =============================================================================
    // CREATE & VALIDATION
    // =============================================================================

    #[tokio::test]
    async fn test_create_product() {
        let reply = engine().dispatch_root(shirt()).await;

        assert_eq!(reply.doc_type, Some(DocumentType::Result));
        let output = reply.output.unwrap();
        assert!(!output["id"].as_str().unwrap().is_empty());
        assert_eq!(output["name"], "Shirt");
        assert_eq!(output["slug"], "shirt");
        assert_eq!(output["description"], "");
    }

    #[tokio::test]
    async fn test_missing_name_names_the_field() {
        let mut doc = shirt();
        doc.form.remove("name");

        let reply = engine().dispatch_root(doc).await;
        assert_eq!(reply.doc_type, Some(DocumentType::Error));
        assert_eq!(
            reply.error.as_deref(),
            Some("the field named name is requre but not found")
        );
        assert!(reply.output.is_none());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let mut doc = shirt();
        doc.form.insert("name".into(), json!(""));

        let reply = engine().dispatch_root(doc).await;
        assert_eq!(
            reply.error.as_deref(),
            Some("the field named name is marked as cannot be empty")
        );
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let reply = engine()
            .dispatch_root(Document::new("product", "delete"))
            .await;
        assert!(reply.is_error());
        assert_eq!(reply.error.as_deref(), Some("transaction not found"));
        assert_eq!(reply.department, "product");
        assert_eq!(reply.transaction, "delete");
    }

    #[tokio::test]
    async fn test_handler_error_passes_through() {
        let reply = engine()
            .dispatch_root(Document::new("product", "fail"))
            .await;
        assert_eq!(reply.error.as_deref(), Some("out of stock"));
    }

    // =============================================================================
    // PROCEDURE
    // =============================================================================

    #[tokio::test]
    async fn test_procedure_describes_shape() {
        // The form is irrelevant for a procedure request, even an invalid one.
        let doc = Document::new("product", "create")
            .with_type(DocumentType::Procedure)
            .with_form(form(json!({"bogus": true})));

        let reply = engine().dispatch_root(doc).await;
        assert_eq!(reply.doc_type, Some(DocumentType::Procedure));

        let output = reply.output.unwrap();
        assert_eq!(output["request"]["name"]["require"], true);
        assert_eq!(output["request"]["counter"]["type"], "Number");
        assert_eq!(output["request"]["description"]["require"], false);
        assert_eq!(output["response"]["id"]["type"], "String");
        assert_eq!(
            reply.options.unwrap().header.get("X-Department").map(String::as_str),
            Some("product")
        );
    }

    // =============================================================================
    // CHAINING
    // =============================================================================

    #[tokio::test]
    async fn test_child_form_is_parent_output() {
        let doc = shirt().with_dispatching(Document::new("product", "echo"));
        let reply = engine().dispatch_root(doc).await;

        let parent = reply.output.clone().unwrap();
        let child = &reply.dispatchings[0];
        assert_eq!(child.doc_type, Some(DocumentType::Result));
        assert_eq!(child.output.as_ref().unwrap(), &parent);
    }

    #[tokio::test]
    async fn test_alias_remapping() {
        let doc = shirt()
            .with_chain_alias("id", "product_id")
            .with_dispatching(Document::new("product", "echo"));
        let reply = engine().dispatch_root(doc).await;

        let parent_id = reply.output.as_ref().unwrap()["id"].clone();
        let child = reply.dispatchings[0].output.as_ref().unwrap();
        assert_eq!(child["product_id"], parent_id);
        assert_eq!(child["id"], parent_id);
    }

    #[tokio::test]
    async fn test_first_failure_stops_siblings() {
        let doc = shirt()
            .with_dispatching(Document::new("product", "echo"))
            .with_dispatching(Document::new("product", "fail"))
            .with_dispatching(Document::new("product", "echo"));
        let reply = engine().dispatch_root(doc).await;

        assert_eq!(reply.doc_type, Some(DocumentType::Result));
        assert_eq!(reply.dispatchings.len(), 2);
        assert!(!reply.dispatchings[0].is_error());
        assert_eq!(reply.dispatchings[1].error.as_deref(), Some("out of stock"));
    }

    #[tokio::test]
    async fn test_failed_parent_skips_children() {
        let doc = Document::new("product", "fail").with_dispatching(Document::new("product", "echo"));
        let reply = engine().dispatch_root(doc).await;
        assert!(reply.is_error());
        assert!(reply.dispatchings.is_empty());
    }

    #[tokio::test]
    async fn test_nested_chain_depth_two() {
        let doc = shirt().with_dispatching(
            Document::new("product", "echo").with_dispatching(Document::new("product", "echo")),
        );
        let reply = engine().dispatch_root(doc).await;

        let grandchild = &reply.dispatchings[0].dispatchings[0];
        assert_eq!(grandchild.output.as_ref().unwrap()["name"], "Shirt");
    }

    // =============================================================================
    // AUTHORIZATION & CONTEXT
    // =============================================================================

    #[tokio::test]
    async fn test_licence_required() {
        let engine = engine();

        let missing = engine.dispatch_root(Document::new("secure", "whoami")).await;
        assert_eq!(missing.error.as_deref(), Some("licence not found"));

        let wrong = engine
            .dispatch_root(Document::new("secure", "whoami").with_licence("guess"))
            .await;
        assert_eq!(wrong.error.as_deref(), Some("licence not found"));

        let ok = engine
            .dispatch_root(Document::new("secure", "whoami").with_licence(VALID_LICENCE))
            .await;
        assert_eq!(ok.output.unwrap()["licence"], VALID_LICENCE);
    }

    #[tokio::test]
    async fn test_licence_and_verify_code_reach_children() {
        let doc = Document::new("product", "echo")
            .with_licence(VALID_LICENCE)
            .with_verify_code("vc-42")
            .with_dispatching(Document::new("secure", "whoami"));
        let ctx = DispatchContext::from_document(&doc);

        let reply = engine().dispatch(doc, &ctx).await;
        let child = reply.dispatchings[0].output.as_ref().unwrap();
        assert_eq!(child["licence"], VALID_LICENCE);
        assert_eq!(child["verify_code"], "vc-42");
    }

    // =============================================================================
    // IDEMPOTENCE
    // =============================================================================

    #[tokio::test]
    async fn test_side_effect_free_handler_is_idempotent() {
        let engine = engine();
        let doc = Document::new("product", "echo").with_form(form(json!({"a": 1, "b": [1, 2]})));

        let first = engine.dispatch_root(doc.clone()).await;
        let second = engine.dispatch_root(doc).await;
        assert_eq!(first.output, second.output);
        assert_eq!(first, second);
    }
}
