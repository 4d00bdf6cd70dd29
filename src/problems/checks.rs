// src/problems/checks.rs
//
// Fixed, ordered checks per problem. Arguments and expected values are JSON
// because that is what crosses the sandbox boundary.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// Result must equal the value (numbers compare by value, like `==`).
    Returns { value: Value },
    /// Numeric result within `eps`.
    Approx { value: f64, eps: f64 },
    /// Truthiness of the result must match.
    Truthy { value: bool },
    /// Call must raise an exception of this class name.
    Raises { class: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    /// Human-readable rendering of the input, used in failure messages.
    pub label: String,
    pub args: Vec<Value>,
    pub expect: Expectation,
}

impl Check {
    pub fn new(args: Vec<Value>, expect: Expectation) -> Self {
        let label = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            label,
            args,
            expect,
        }
    }

    pub fn returns(args: Vec<Value>, value: Value) -> Self {
        Self::new(args, Expectation::Returns { value })
    }

    pub fn approx(args: Vec<Value>, value: f64) -> Self {
        Self::new(args, Expectation::Approx { value, eps: 1e-9 })
    }

    pub fn truthy(args: Vec<Value>, value: bool) -> Self {
        Self::new(args, Expectation::Truthy { value })
    }

    pub fn raises(args: Vec<Value>, class: &str) -> Self {
        Self::new(
            args,
            Expectation::Raises {
                class: class.to_string(),
            },
        )
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

pub fn checks_for(problem: &str) -> Option<Vec<Check>> {
    let checks = match problem {
        "cosine_similarity" => cosine_similarity(),
        "evaluate_rpn" => evaluate_rpn(),
        "int_to_roman" => int_to_roman(),
        "is_palindrome_sentence" => is_palindrome_sentence(),
        "merge_intervals" => merge_intervals(),
        "min_window_substring" => min_window_substring(),
        "normalize_path" => normalize_path(),
        "parse_csv_line" => parse_csv_line(),
        "sudoku_is_valid" => sudoku_is_valid(),
        "top_k_frequent" => top_k_frequent(),
        _ => return None,
    };
    Some(checks)
}

/* ============================================================
   Fixtures
   ============================================================ */

fn cosine_similarity() -> Vec<Check> {
    let dot: f64 = 1.0 * 4.0 + 2.0 * 5.0 + 3.0 * 6.0;
    let expected = dot / ((1.0f64 + 4.0 + 9.0).sqrt() * (16.0f64 + 25.0 + 36.0).sqrt());

    vec![
        Check::approx(vec![json!([1, 0, 0]), json!([1, 0, 0])], 1.0).labeled("identical vectors"),
        Check::approx(vec![json!([1, 1]), json!([0, 0])], 0.0).labeled("zero vector"),
        Check::approx(vec![json!([1, 2, 3]), json!([4, 5, 6])], expected).labeled("3D"),
        Check::raises(vec![json!([1, 2]), json!([1, 2, 3])], "ValueError")
            .labeled("length mismatch"),
    ]
}

fn evaluate_rpn() -> Vec<Check> {
    vec![
        Check::returns(vec![json!(["2", "1", "+", "3", "*"])], json!(9)),
        Check::returns(vec![json!(["4", "13", "5", "/", "+"])], json!(6)),
        Check::returns(
            vec![json!([
                "10", "6", "9", "3", "+", "-11", "*", "/", "*", "17", "+", "5", "+"
            ])],
            json!(22),
        ),
        // truncation toward zero; -0 and 0 are the same integer
        Check::returns(vec![json!(["3", "-4", "/"])], json!(0)),
        Check::raises(vec![json!(["1", "0", "/"])], "ValueError").labeled("division by zero"),
    ]
}

fn int_to_roman() -> Vec<Check> {
    let known: [(i64, &str); 9] = [
        (1, "I"),
        (4, "IV"),
        (9, "IX"),
        (58, "LVIII"),
        (1994, "MCMXCIV"),
        (3999, "MMMCMXCIX"),
        (44, "XLIV"),
        (945, "CMXLV"),
        (3888, "MMMDCCCLXXXVIII"),
    ];

    let mut checks: Vec<Check> = known
        .iter()
        .map(|(n, r)| Check::returns(vec![json!(n)], json!(r)))
        .collect();

    for bad in [0, -1, 4000, 10000] {
        checks.push(Check::raises(vec![json!(bad)], "ValueError"));
    }

    checks
}

fn is_palindrome_sentence() -> Vec<Check> {
    [
        ("A man, a plan, a canal: Panama", true),
        ("No lemon, no melon!", true),
        ("race a car", false),
        ("", true),
        ("!!!!", true),
        ("ab@#a", true),
        ("Aa", true),
    ]
    .iter()
    .map(|(s, exp)| Check::returns(vec![json!(s)], json!(exp)))
    .collect()
}

fn merge_intervals() -> Vec<Check> {
    vec![
        Check::returns(
            vec![json!([[1, 3], [2, 6], [8, 10], [15, 18]])],
            json!([[1, 6], [8, 10], [15, 18]]),
        ),
        Check::returns(vec![json!([[1, 4], [4, 5]])], json!([[1, 5]])),
        Check::returns(vec![json!([])], json!([])),
        Check::returns(vec![json!([[1, 1]])], json!([[1, 1]])),
        Check::returns(vec![json!([[5, 7], [1, 2], [2, 3]])], json!([[1, 3], [5, 7]])),
        Check::returns(vec![json!([[1, 5], [2, 3]])], json!([[1, 5]])),
    ]
}

fn min_window_substring() -> Vec<Check> {
    [
        ("ADOBECODEBANC", "ABC", "BANC"),
        ("a", "a", "a"),
        ("a", "aa", ""),
        ("ab", "b", "b"),
        ("ab", "A", ""),
        ("", "a", ""),
        ("aa", "aa", "aa"),
    ]
    .iter()
    .map(|(s, t, exp)| Check::returns(vec![json!(s), json!(t)], json!(exp)))
    .collect()
}

fn normalize_path() -> Vec<Check> {
    [
        ("/a//b/./c/../", "/a/b/"),
        ("a/b/../../c", "c"),
        ("../../x", "../../x"),
        ("/", "/"),
        ("/././", "/"),
        ("/../", "/"),
        ("a//b////c", "a/b/c"),
        ("a/./b/./c/", "a/b/c/"),
        ("a/../../..", "../../"),
        ("a/../..", "../"),
        ("", ""),
    ]
    .iter()
    .map(|(inp, exp)| Check::returns(vec![json!(inp)], json!(exp)))
    .collect()
}

fn parse_csv_line() -> Vec<Check> {
    vec![
        Check::returns(vec![json!("a,b,c")], json!(["a", "b", "c"])),
        Check::returns(vec![json!("a,\"b,c\",d")], json!(["a", "b,c", "d"])),
        Check::returns(vec![json!("\"a\"\"b\",c")], json!(["a\"b", "c"])),
        Check::returns(vec![json!("")], json!([""])),
        Check::returns(vec![json!("\"\",\"\",")], json!(["", "", ""])),
        Check::returns(vec![json!("\" spaced \",x")], json!([" spaced ", "x"])),
    ]
}

fn valid_sudoku_board() -> Vec<Vec<&'static str>> {
    vec![
        vec!["5", "3", ".", ".", "7", ".", ".", ".", "."],
        vec!["6", ".", ".", "1", "9", "5", ".", ".", "."],
        vec![".", "9", "8", ".", ".", ".", ".", "6", "."],
        vec!["8", ".", ".", ".", "6", ".", ".", ".", "3"],
        vec!["4", ".", ".", "8", ".", "3", ".", ".", "1"],
        vec!["7", ".", ".", ".", "2", ".", ".", ".", "6"],
        vec![".", "6", ".", ".", ".", ".", "2", "8", "."],
        vec![".", ".", ".", "4", "1", "9", ".", ".", "5"],
        vec![".", ".", ".", ".", "8", ".", ".", "7", "9"],
    ]
}

fn sudoku_is_valid() -> Vec<Check> {
    let valid = valid_sudoku_board();

    let mut invalid_row = valid.clone();
    invalid_row[0][0] = "8";
    invalid_row[0][1] = "8";

    let mut invalid_box = valid.clone();
    invalid_box[0][0] = "9";

    let mut invalid_col = valid.clone();
    invalid_col[1][0] = "5";

    vec![
        Check::truthy(vec![json!(valid)], true).labeled("valid board"),
        Check::truthy(vec![json!(invalid_row)], false).labeled("invalid_row board"),
        Check::truthy(vec![json!(invalid_box)], false).labeled("invalid_box board"),
        Check::truthy(vec![json!(invalid_col)], false).labeled("invalid_col board"),
    ]
}

fn top_k_frequent() -> Vec<Check> {
    let case = |nums: Value, k: i64| -> (Vec<Value>, String) {
        let label = format!("{nums}, k={k}");
        (vec![nums, json!(k)], label)
    };

    let mut checks = Vec::new();

    for (nums, k, expected) in [
        (json!([1, 1, 1, 2, 2, 3]), 2, json!([1, 2])),
        (json!([4, 4, 4, 5, 5, 6]), 1, json!([4])),
        // tie -> smaller first
        (json!([3, 3, 2, 2, 1]), 2, json!([2, 3])),
        (json!([1]), 1, json!([1])),
    ] {
        let (args, label) = case(nums, k);
        checks.push(Check::returns(args, expected).labeled(label));
    }

    for k in [0, 4] {
        let (args, label) = case(json!([1, 2, 3]), k);
        checks.push(Check::raises(args, "ValueError").labeled(label));
    }

    checks
}
