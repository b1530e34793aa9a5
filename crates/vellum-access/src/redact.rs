//! Removing redacted fields from a read response.

use serde_json::Value;
use vellum_schema::Payload;

use crate::evaluator::AccessReport;

/// Strip every field the report marks as redacted.
///
/// Works at any depth: a redacted `review.notes` is removed from inside
/// the `review` object and the rest of the composite is kept. Returns the
/// removed paths.
pub fn redact(payload: &mut Payload, report: &AccessReport) -> Vec<String> {
    let mut removed = Vec::new();
    for outcome in report.outcomes().iter().filter(|o| o.is_redacted()) {
        if remove_path(payload, &outcome.path) {
            removed.push(outcome.path.clone());
        }
    }
    removed
}

fn remove_path(payload: &mut Payload, path: &str) -> bool {
    match path.split_once('.') {
        None => payload.remove(path).is_some(),
        Some((head, rest)) => match payload.get_mut(head) {
            Some(Value::Object(inner)) => remove_path(inner, rest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessEvaluator;
    use serde_json::json;
    use vellum_core::{FieldNote, Identity, OperationKind, Role, RoleSet, SubjectId};
    use vellum_schema::{FieldDefinition, SchemaDefinition, SchemaRegistry};

    #[test]
    fn removes_nested_and_decryption_failures() {
        let reg = SchemaRegistry::new(RoleSet::parse_list("user,admin").unwrap());
        let schema = reg
            .publish(
                &SchemaDefinition::new("doc")
                    .roles(["user", "admin"])
                    .field(FieldDefinition::new("title", "string"))
                    .field(FieldDefinition::new("secret", "text").encrypted())
                    .field(
                        FieldDefinition::new("meta", "composite")
                            .sub_field(FieldDefinition::new("owner", "string"))
                            .sub_field(FieldDefinition::new("cost", "number").roles(["admin"])),
                    ),
            )
            .unwrap();
        let user = Identity::new(SubjectId::new("u").unwrap(), [Role::new("user").unwrap()]).unwrap();

        let mut payload = match json!({
            "title": "t",
            "secret": "vellum:enc:v1:garbage",
            "meta": {"owner": "o", "cost": 4}
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let mut report =
            AccessEvaluator::default().evaluate_payload(&user, &schema, &payload, OperationKind::Read);
        report.note("secret", FieldNote::DecryptionFailed);

        let removed = redact(&mut payload, &report);
        assert_eq!(removed, vec!["secret".to_string(), "meta.cost".into()]);
        assert_eq!(
            Value::Object(payload),
            json!({"title": "t", "meta": {"owner": "o"}})
        );
    }
}
