use crate::analysis::well_formed;
use crate::init_subscriber;
use crate::ir::IRModule;
use crate::transform;
use crate::DefaultTransformDispatch;
use crate::Passes;
use crate::RewriteResult;
use crate::TransformOptions;
use std::cmp::max;
use std::panic::Location;
use tracing::info;

pub struct Tester;

impl Tester {
    /// Initialize the subscriber for the tests.
    ///
    /// Cannot pass options, since the tests run concurrently.
    pub fn init_tracing() {
        let level = tracing::Level::INFO;
        match init_subscriber(level) {
            Ok(_) => (),
            Err(_e) => (),
        }
    }
    fn point_to_missing_line(expected: &str, index: usize) -> String {
        let mut result = String::new();
        result.push_str("A line is missing from the output:\n");
        result.push_str("```");
        for (i, line) in expected.lines().enumerate() {
            if i == index {
                result.push_str(&format!("\n{line}   <== missing"));
            } else {
                result.push_str(&format!("\n{line}"));
            }
        }
        result.push_str("\n```");
        result
    }
    /// Check that `actual` and `expected` are the same, line by line.
    pub fn check_lines_exact(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim().lines().collect::<Vec<&str>>();
        let expected = expected.trim().lines().collect::<Vec<&str>>();
        for i in 0..max(actual.len(), expected.len()) {
            let (actual_line, expected_line) = match (actual.get(i), expected.get(i)) {
                (Some(actual_line), Some(expected_line)) => (actual_line, expected_line),
                _ => panic!("Expected line {i} not found in output: called from {caller}"),
            };
            assert_eq!(actual_line, expected_line, "called from {}", caller);
        }
    }
    /// Check whether the expected lines are present in the actual output.
    ///
    /// The actual output may contain additional lines that are not in the
    /// expected output, but the expected lines have to appear in order.
    pub fn check_lines_contain(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim().lines().collect::<Vec<&str>>();
        let mut actual_index = 0;
        'outer: for (i, expected_line) in expected.trim().lines().enumerate() {
            let expected_line = expected_line.trim();
            // An empty line would match any line.
            if expected_line.is_empty() {
                continue;
            }
            for (j, actual_line) in actual.iter().enumerate().skip(actual_index) {
                if actual_line.contains(expected_line) {
                    actual_index = j + 1;
                    continue 'outer;
                }
            }
            let msg = Self::point_to_missing_line(expected.trim(), i);
            panic!("{msg}\nwhen called from {caller}");
        }
    }
    fn print_heading(msg: &str, src: &str) {
        info!("{msg}:\n```\n{src}\n```\n");
    }
    /// Run the passes in `arguments` on `module` and return the new module
    /// together with its printed form.
    ///
    /// Panics when the passes do not change anything.
    pub fn transform(arguments: Vec<&str>, module: &IRModule) -> (IRModule, String) {
        let msg = format!("Before (transform {arguments:?})");
        Self::print_heading(&msg, &module.to_string());

        let passes = Passes::from_convert_vec(arguments.clone());
        let mut options = TransformOptions::from_passes(passes);
        options.set_print_ir_before_all(arguments.contains(&"--print-ir-before-all"));
        let result = transform::<DefaultTransformDispatch>(module, &options).unwrap();
        let new_module = match result {
            RewriteResult::Changed(new_module) => new_module,
            RewriteResult::Unchanged => {
                panic!("Expected changes");
            }
        };
        let actual = new_module.to_string();
        let msg = format!("After (transform {arguments:?})");
        Self::print_heading(&msg, &actual);
        (new_module, actual)
    }
    /// Run extra verification on a module.
    ///
    /// Production code does not check well-formedness after every rewrite;
    /// the tests do, so that a rewrite that produces broken IR is caught even
    /// when the printed output looks right.
    pub fn verify(module: &IRModule) {
        if let Err(err) = well_formed(module) {
            panic!("module is not well formed: {err}\n{module}");
        }
    }
}
