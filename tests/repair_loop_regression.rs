use std::cell::RefCell;
use std::time::Duration;

use codegen_eval::codegen::runner::run_candidate;
use codegen_eval::codegen::{run_repair_loop, Candidate, RepairContext};
use codegen_eval::error::ModelError;
use codegen_eval::executor::PythonSandbox;
use codegen_eval::llm::{ModelClient, TemplateSet};
use codegen_eval::problems::{catalog, find, Problem};

const RPN_BUGGY: &str = r#"
def evaluate_rpn(tokens):
    stack = []
    for t in tokens:
        if t in "+-*/":
            b = stack.pop()
            a = stack.pop()
            if t == "+":
                stack.append(a + b)
            elif t == "-":
                stack.append(a - b)
            elif t == "*":
                stack.append(a * b)
            else:
                stack.append(a // b)
        else:
            stack.append(int(t))
    return stack[0]
"#;

const RPN_FIXED: &str = r#"
def evaluate_rpn(tokens):
    stack = []
    for t in tokens:
        if t in ("+", "-", "*", "/"):
            if len(stack) < 2:
                raise ValueError("Too few operands for operator: " + t)
            b = stack.pop()
            a = stack.pop()
            if t == "+":
                stack.append(a + b)
            elif t == "-":
                stack.append(a - b)
            elif t == "*":
                stack.append(a * b)
            else:
                if b == 0:
                    raise ValueError("Division by zero")
                stack.append(int(a / b))
        else:
            try:
                stack.append(int(t))
            except ValueError:
                raise ValueError("Invalid token: " + t)
    if len(stack) != 1:
        raise ValueError("Invalid RPN expression")
    return stack[0]
"#;

fn sandbox() -> Option<PythonSandbox> {
    let sb = PythonSandbox::new("python3", Duration::from_secs(10));
    sb.available().then_some(sb)
}

fn rpn() -> Problem {
    find(&catalog(), "evaluate_rpn").unwrap().clone()
}

struct Replay {
    responses: RefCell<Vec<String>>,
    prompts: RefCell<Vec<String>>,
}

impl Replay {
    fn new(responses: &[&str]) -> Self {
        let mut responses: Vec<String> = responses.iter().map(|r| r.to_string()).collect();
        responses.reverse();
        Self {
            responses: RefCell::new(responses),
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl ModelClient for Replay {
    fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, ModelError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let next = self
            .responses
            .borrow_mut()
            .pop()
            .ok_or_else(|| ModelError::Request("no more responses".into()))?;
        Ok(vec![next; n])
    }

    fn label(&self) -> String {
        "replay:rpn".into()
    }
}

#[test]
fn python_candidate_passes_rpn_fixture() {
    let Some(sb) = sandbox() else { return };
    let problem = rpn();

    let outcome = run_candidate(&sb, &Candidate::from_code(RPN_FIXED), &problem.function, &problem.checks());
    assert!(outcome.passed, "{:?}", outcome.failures);
}

#[test]
fn custom_value_error_subclass_satisfies_raise_checks() {
    let Some(sb) = sandbox() else { return };
    let problem = rpn();

    let code = format!(
        "class RPNError(ValueError):\n    pass\n{}",
        RPN_FIXED.replace("raise ValueError(", "raise RPNError(")
    );
    let outcome = run_candidate(&sb, &Candidate::from_code(&code), &problem.function, &problem.checks());
    assert!(outcome.passed, "{:?}", outcome.failures);
}

#[test]
fn floor_division_bug_is_reported_as_mismatch() {
    let Some(sb) = sandbox() else { return };
    let problem = rpn();

    let outcome = run_candidate(&sb, &Candidate::from_code(RPN_BUGGY), &problem.function, &problem.checks());
    assert!(!outcome.passed);
    assert!(
        outcome.failures.iter().any(|f| f.contains("expected 0")),
        "{:?}",
        outcome.failures
    );
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.starts_with("division by zero raised ZeroDivisionError")));
}

#[test]
fn wrong_function_name_and_bad_syntax() {
    let Some(sb) = sandbox() else { return };
    let problem = rpn();

    let renamed = Candidate::from_code("def evalRPN(tokens):\n    return 0\n");
    let outcome = run_candidate(&sb, &renamed, &problem.function, &problem.checks());
    assert_eq!(
        outcome.failures,
        vec!["Function evaluate_rpn not found after exec (defined: evalRPN)"]
    );

    let broken = Candidate::from_code("def evaluate_rpn(tokens)\n    return 0\n");
    let outcome = run_candidate(&sb, &broken, &problem.function, &problem.checks());
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].starts_with("Code failed to import: SyntaxError"));
}

#[test]
fn repair_loop_fixes_rpn_in_python() {
    let Some(sb) = sandbox() else { return };
    let problem = rpn();
    let client = Replay::new(&[
        format!("```python{RPN_BUGGY}```").as_str(),
        format!("Fixed the truncation:\n```python{RPN_FIXED}```").as_str(),
    ]);
    let templates = TemplateSet::default();
    let ctx = RepairContext {
        client: &client,
        sandbox: &sb,
        templates: &templates,
        pause: Duration::ZERO,
    };

    let history = run_repair_loop(&ctx, &problem, &problem.checks(), 2).unwrap();

    assert_eq!(history.len(), 2);
    assert!(!history[0].outcome.passed);
    assert!(history[1].outcome.passed);
    assert!(history[1].similarity_to_previous.is_some_and(|s| s > 0.0 && s < 1.0));

    let prompts = client.prompts.borrow();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("stack.append(a // b)"));
}
