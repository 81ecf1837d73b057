//! Integration tests for templates, the function registry and templated queries
//!
//! These run without a database: queries go to the in-memory
//! `RecordingExecutor`.

use serde::Serialize;
use serde_json::json;
use sql_templater::test_helpers::RecordingExecutor;
use sql_templater::{
    equals_or_in, equals_or_in_positional, FunctionError, FunctionRegistry, ParamHandler, PlaceholderCounter,
    PlaceholderError, PlaceholderStyle, RegistryError, SqlTemplate, TemplateFn, TemplatedQuery,
    ToSql,
};

#[derive(Debug, Serialize)]
struct TicketFilter {
    projects: Vec<i64>,
    assignee: Option<String>,
    min_priority: Option<i32>,
}

impl ParamHandler for TicketFilter {
    fn params(&self) -> Vec<&dyn ToSql> {
        let mut params: Vec<&dyn ToSql> = self.projects.iter().map(|p| p as &dyn ToSql).collect();
        if let Some(assignee) = self.assignee.as_ref().filter(|a| !a.is_empty()) {
            params.push(assignee);
        }
        if let Some(priority) = self.min_priority.as_ref().filter(|p| **p != 0) {
            params.push(priority);
        }
        params
    }
}

const TICKETS_SQL: &str = "SELECT id, title FROM tickets WHERE project_id{{inPositional projects}}\
    {{#if (isSet assignee)}} AND assignee = {{positionalParam}}{{/if}}\
    {{#if (isSet min_priority)}} AND priority >= {{positionalParam}}{{/if}}";

// ============================================================================
// Placeholder generation
// ============================================================================

#[test]
fn membership_scenario() {
    assert_eq!(equals_or_in(&["a", "b", "c"]).unwrap(), " IN (?,?,?)");
    assert_eq!(equals_or_in("x").unwrap(), " = ?");
    assert_eq!(equals_or_in(&Vec::<&str>::new()), Err(PlaceholderError::EmptySet));

    let mut counter = PlaceholderCounter::new();
    assert_eq!(
        equals_or_in_positional(&["a", "b"], Some(&mut counter)).unwrap(),
        " IN ($1,$2)"
    );
    assert_eq!(
        equals_or_in_positional("c", Some(&mut counter)).unwrap(),
        " = $3"
    );
}

// ============================================================================
// Templates
// ============================================================================

#[test]
fn optional_filters_number_without_gaps() {
    let template = SqlTemplate::new("tickets", TICKETS_SQL).unwrap();

    let all = TicketFilter {
        projects: vec![1, 2],
        assignee: Some("kim".to_string()),
        min_priority: Some(3),
    };
    assert_eq!(
        template.render(&all).unwrap().sql(),
        "SELECT id, title FROM tickets WHERE project_id IN ($1,$2) AND assignee = $3 AND priority >= $4"
    );

    let skip_assignee = TicketFilter {
        projects: vec![1],
        assignee: None,
        min_priority: Some(3),
    };
    assert_eq!(
        template.render(&skip_assignee).unwrap().sql(),
        "SELECT id, title FROM tickets WHERE project_id = $1 AND priority >= $2"
    );
}

#[test]
fn anonymous_style_emits_question_marks() {
    let template = SqlTemplate::builder(TICKETS_SQL)
        .name("tickets")
        .style(PlaceholderStyle::Anonymous)
        .build()
        .unwrap();
    let filter = TicketFilter {
        projects: vec![1, 2, 3],
        assignee: Some("kim".to_string()),
        min_priority: None,
    };
    assert_eq!(
        template.render(&filter).unwrap().sql(),
        "SELECT id, title FROM tickets WHERE project_id IN (?,?,?) AND assignee = ?"
    );
}

#[test]
fn zero_priority_counts_as_unset() {
    let template = SqlTemplate::new("tickets", TICKETS_SQL).unwrap();
    let filter = TicketFilter {
        projects: vec![5],
        assignee: None,
        min_priority: Some(0),
    };
    assert_eq!(
        template.render(&filter).unwrap().sql(),
        "SELECT id, title FROM tickets WHERE project_id = $1"
    );
}

#[test]
fn concurrent_renders_keep_independent_counters() {
    // Rendering needs more than the default coroutine stack
    may::config().set_stack_size(0x10000);
    let template = SqlTemplate::new("tickets", TICKETS_SQL).unwrap();

    let handles: Vec<_> = (1..=16usize)
        .map(|n| {
            let template = template.clone();
            may::go!(move || {
                let filter = TicketFilter {
                    projects: (0..n as i64).collect(),
                    assignee: Some("kim".to_string()),
                    min_priority: None,
                };
                (n, template.render(&filter).unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (n, query) = handle.join().unwrap();
        assert_eq!(query.placeholders(), n + 1);
        let expected_last = format!("assignee = ${}", n + 1);
        assert!(query.sql().ends_with(&expected_last), "{}", query.sql());
    }
}

// ============================================================================
// Function registry
// ============================================================================

#[test]
fn custom_function_alongside_builtins() {
    let mut functions = FunctionRegistry::new();
    functions
        .register(
            "ilikeAny",
            TemplateFn::text_result(|scope, args| -> Result<String, FunctionError> {
                let patterns = args.first().and_then(|v| v.as_array()).ok_or("ilikeAny expects a list")?;
                if patterns.is_empty() {
                    return Err(PlaceholderError::EmptySet.into());
                }
                let clauses: Vec<String> = patterns
                    .iter()
                    .map(|_| format!("title ILIKE {}", scope.next_placeholder()))
                    .collect();
                Ok(format!("({})", clauses.join(" OR ")))
            }),
        )
        .unwrap();

    let template = SqlTemplate::builder(
        "SELECT id FROM tickets WHERE project_id{{inPositional projects}} AND {{ilikeAny patterns}}",
    )
    .functions(functions)
    .build()
    .unwrap();

    let query = template
        .render(&json!({"projects": [4], "patterns": ["%crash%", "%panic%"]}))
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT id FROM tickets WHERE project_id = $1 AND (title ILIKE $2 OR title ILIKE $3)"
    );
    assert_eq!(query.placeholders(), 3);
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut functions = FunctionRegistry::new();
    let err = functions
        .register("in", TemplateFn::text(|_, _| " = 1".to_string()))
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateName("in".to_string()));

    let template = SqlTemplate::builder("x{{in ids}}")
        .functions(functions)
        .build()
        .unwrap();
    assert_eq!(template.render(&json!({"ids": [1, 2]})).unwrap().sql(), "x IN (?,?)");
}

// ============================================================================
// Templated queries
// ============================================================================

#[test]
fn templated_query_count_then_page() {
    let template = SqlTemplate::new("tickets", TICKETS_SQL).unwrap();
    let executor = RecordingExecutor::with_rows(vec!["t-1".to_string()]).with_count(31);
    let filter = TicketFilter {
        projects: vec![10, 11, 12],
        assignee: Some("kim".to_string()),
        min_priority: None,
    };

    let query = TemplatedQuery::new(&template, &executor, &filter);
    assert_eq!(query.get_count().unwrap(), 31);
    assert_eq!(query.get_page(10, 30, "id").unwrap(), vec!["t-1".to_string()]);

    let recorded = executor.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(
        recorded[0].sql,
        "SELECT count(*) FROM ( SELECT id, title FROM tickets WHERE project_id IN ($1,$2,$3) AND assignee = $4 ) count_query;"
    );
    assert_eq!(
        recorded[1].sql,
        "SELECT id, title FROM tickets WHERE project_id IN ($1,$2,$3) AND assignee = $4 ORDER BY id LIMIT 10 OFFSET 30"
    );
    assert!(recorded.iter().all(|q| q.param_count == 4));
}

#[test]
fn empty_membership_short_circuits() {
    let template = SqlTemplate::new("tickets", TICKETS_SQL).unwrap();
    let executor = RecordingExecutor::new();
    let filter = TicketFilter {
        projects: vec![],
        assignee: None,
        min_priority: None,
    };

    let err = TemplatedQuery::new(&template, &executor, &filter)
        .execute()
        .unwrap_err();
    let is_empty_set = err
        .template_error()
        .and_then(|e| e.function_error())
        .and_then(|e| e.downcast_ref::<PlaceholderError>())
        == Some(&PlaceholderError::EmptySet);
    assert!(is_empty_set, "unexpected error: {err}");
    assert!(executor.recorded().is_empty());
}
