//! Black-box JIT scenarios (§8 "Codegen/JIT scenarios"): write a small
//! source program to a temp file, run the compiled driver against it as a
//! subprocess, and assert on its captured stdout.

use std::io::Write;
use std::process::Command;

fn run_source(source: &str) -> String {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp source file");
    file.write_all(source.as_bytes()).expect("failed to write temp source file");

    let output = Command::new(env!("CARGO_BIN_EXE_summer"))
        .arg(file.path())
        .output()
        .expect("failed to run the summer binary");

    assert!(
        output.status.success(),
        "summer exited with {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout was not valid UTF-8")
}

#[test]
fn extern_call_prints_forty_two() {
    let stdout = run_source("extern print_number(x:number) -> void\nprint_number(40+2)\n");
    assert_eq!(stdout.trim(), "42");
}

#[test]
fn user_function_squares_seven() {
    let stdout = run_source(
        "extern print_number(x:number) -> void\n\
         function square(x:number) -> number begin return x*x end\n\
         print_number(square(7))\n",
    );
    assert_eq!(stdout.trim(), "49");
}

#[test]
fn recursive_fibonacci_of_ten() {
    let stdout = run_source(
        "extern print_number(x:number) -> void\n\
         function fib(n:number) -> number begin \
            if n<2 then begin return n end else begin return fib(n-1)+fib(n-2) end \
         end\n\
         print_number(fib(10))\n",
    );
    assert_eq!(stdout.trim(), "55");
}

#[test]
fn for_loop_prints_one_two_three() {
    let stdout = run_source(
        "extern print_number(x:number) -> void\n\
         for i:number = 1, i<4, 1 in begin print_number(i) end\n",
    );
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["1", "2", "3"]);
}

#[test]
fn var_accumulates_sum_of_one_through_five() {
    let stdout = run_source(
        "extern print_number(x:number) -> void\n\
         function sum_to_five() -> number begin \
            var s:number = 0 in begin \
               for i:number = 1, i<=5, 1 in begin s = s + i end \
               return s \
            end \
         end\n\
         print_number(sum_to_five())\n",
    );
    assert_eq!(stdout.trim(), "15");
}

#[test]
fn bare_top_level_var_block_sums_one_through_five() {
    // Same accumulation, but run as a literal top-level expression rather
    // than a named function's body — this is `Prototype::anonymous`'s
    // `Var` path, not its `Call` path, and is otherwise untested.
    let stdout = run_source(
        "extern print_number(x:number) -> void\n\
         var s:number = 0 in begin \
            for i:number = 1, i<=5, 1 in begin s = s + i end \
            print_number(s) \
            return s \
         end\n",
    );
    assert_eq!(stdout.trim(), "15");
}
