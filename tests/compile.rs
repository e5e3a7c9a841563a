// Integration tests for the rcc compiler.
// Programs are compiled through the library; on x86-64 Linux with a working
// `cc` the assembly is also linked and executed and its exit status checked.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use rcc::{ErrorKind, generate_assembly};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID for temp files
fn unique_id() -> u64 {
  TEST_COUNTER.fetch_add(1, Ordering::SeqCst)
}

fn temp_path(stem: &str, ext: &str) -> PathBuf {
  std::env::temp_dir().join(format!(
    "rcc_{stem}_{}_{}{ext}",
    std::process::id(),
    unique_id()
  ))
}

fn compile(source: &str) -> String {
  match generate_assembly(source) {
    Ok(asm) => asm,
    Err(err) => panic!("compilation failed:\n{err}"),
  }
}

/// Assemble, link and run the program, returning its exit status.
/// `None` means the host cannot execute x86-64 Linux binaries.
fn run(source: &str) -> Option<i32> {
  if !cfg!(all(target_arch = "x86_64", target_os = "linux")) {
    return None;
  }

  let asm = compile(source);
  let asm_path = temp_path("prog", ".s");
  let exe_path = temp_path("prog", "");
  fs::write(&asm_path, asm).expect("write assembly");

  let linked = Command::new("cc")
    .arg("-o")
    .arg(&exe_path)
    .arg(&asm_path)
    .output();
  let _ = fs::remove_file(&asm_path);

  let linked = match linked {
    Ok(output) => output,
    Err(err) => {
      eprintln!("skipping execution, cc is unavailable: {err}");
      return None;
    }
  };
  assert!(
    linked.status.success(),
    "cc rejected the assembly: {}",
    String::from_utf8_lossy(&linked.stderr)
  );

  let status = Command::new(&exe_path).status().expect("run program");
  let _ = fs::remove_file(&exe_path);
  status.code()
}

fn assert_exit(expected: i32, source: &str) {
  if let Some(code) = run(source) {
    assert_eq!(code, expected, "program:\n{source}");
  }
}

/// Check many `(expected, expression)` pairs in one program. A failing case
/// makes `main` return its 1-based index.
fn assert_cases(prelude: &str, cases: &[(i64, &str)]) {
  let mut source = String::from(prelude);
  source.push_str("\nint main() {\n");
  for (idx, (expected, expr)) in cases.iter().enumerate() {
    source.push_str(&format!("  if (({expr}) != {expected}) return {};\n", idx + 1));
  }
  source.push_str("  return 0;\n}\n");

  if let Some(code) = run(&source) {
    assert!(
      code == 0,
      "case {code} failed: {:?}",
      cases.get((code as usize).wrapping_sub(1))
    );
  }
}

#[test]
fn function_with_parameters() {
  let source = "int f(int a, int b) { int c = a + b; return c * 2; }\n\
                int main() { return f(3, 4); }\n";
  let asm = compile(source);
  assert!(asm.contains("f:"));
  assert!(asm.contains("call f"));
  assert_exit(14, source);
}

#[test]
fn struct_members() {
  let source = "struct Point { int x; int y; };\n\
                int main() { struct Point p; p.x = 3; p.y = 4; return p.x + p.y; }\n";
  let asm = compile(source);
  assert!(asm.contains("add $4, %rax"));
  assert_exit(7, source);
}

#[test]
fn linked_list_of_self_referential_structs() {
  let source = "struct Node { int value; struct Node *next; };\n\
                struct Node *push(struct Node *head, struct Node *cell, int v) { cell->value = v; cell->next = head; return cell; }\n\
                int main() {\n\
                  struct Node a; struct Node b; struct Node c;\n\
                  struct Node *list = push(push(push(0, &a, 1), &b, 2), &c, 4);\n\
                  int sum = 0;\n\
                  while (list) { sum = sum * 10 + list->value; list = list->next; }\n\
                  return sum % 256;\n\
                }\n";
  compile(source);
  // 421 % 256
  assert_exit(165, source);
}

#[test]
fn forward_declared_struct_is_completed_later() {
  let source = "struct Pair;\n\
                struct Pair *pick(struct Pair *p) { return p; }\n\
                struct Pair { char tag; long value; };\n\
                int main() { struct Pair pair; pair.value = 40; return pick(&pair)->value + sizeof(pair) / 8; }\n";
  assert_exit(42, source);
}

#[test]
fn control_flow() {
  assert_cases(
    "",
    &[
      (3, "({ int x; if (0) x = 2; else x = 3; x; })"),
      (3, "({ int x; if (1 - 1) x = 2; x = 3; x; })"),
      (69, "({ int x; if (1) x = 69; else x = 64; x; })"),
      (69, "({ int x; if (2 - 1) x = 69; else x = 64; x; })"),
      (55, "({ int i = 0; int j = 0; for (i = 0; i <= 10; i = i + 1) j = i + j; j; })"),
      (6, "({ int i = 0; while (i < 6) { i = i + 1; } i; })"),
      (3, "({ 1; {2;} 3; })"),
      (5, "({ ;;; 5; })"),
      (10, "({ int i=0; while(i<10) i=i+1; i; })"),
      (55, "({ int i=0; int j=0; while(i<=10) {j=i+j; i=i+1;} j; })"),
      (3, "({ int i=0; for (;;) { if (i == 3) break; i++; } i; })"),
      (25, "({ int s=0; for (int i=0; i<10; i++) { if (i % 2 == 0) continue; s += i; } s; })"),
      (1, "0 || 2"),
      (0, "1 && 0"),
      (7, "1 ? 7 : 9"),
    ],
  );
}

#[test]
fn variables_and_sizes() {
  assert_cases(
    "int g1, arr[4];",
    &[
      (5, "({ int a; a = 5; a; })"),
      (5, "({ int a = 5; a; })"),
      (9, "({ int a = 2; int z = 7; a + z; })"),
      (6, "({ int a; int b; a = b = 3; a + b; })"),
      (8, "({ int skibidi123 = 3; int variable = 5; skibidi123 + variable; })"),
      (4, "({ int x; sizeof x; })"),
      (8, "({ int *x; sizeof(x); })"),
      (16, "({ int x[4]; sizeof(x); })"),
      (48, "({ int x[3][4]; sizeof(x); })"),
      (16, "({ int x[3][4]; sizeof(*x); })"),
      (4, "({ int x[3][4]; sizeof(**x); })"),
      (5, "({ int x[3][4]; sizeof **x + 1; })"),
      (4, "({ int x = 1; sizeof(x = 2); })"),
      (1, "({ int x = 1; sizeof(x = 2); x; })"),
      (0, "g1"),
      (3, "({ g1 = 3; g1; })"),
      (2, "({ arr[0] = 0; arr[1] = 1; arr[2] = 2; arr[3] = 3; arr[2]; })"),
      (16, "sizeof(arr)"),
      (2, "({ char x = 1; char y = 2; y; })"),
      (10, "({ char x[10]; sizeof(x); })"),
      (2, "({ int x = 2; { int x = 3; } x; })"),
      (3, "({ int x = 2; { x = 3; } x; })"),
      (7, "({ int x; int y; char z; char *a = &y; char *b = &z; b - a; })"),
      (1, "({ int x; char y; int z; char *a = &y; char *b = &z; b - a; })"),
    ],
  );
}

#[test]
fn pointers_and_arithmetic() {
  assert_cases(
    "",
    &[
      (3, "({ int x = 3; int *p = &x; *p; })"),
      (5, "({ int a[3]; a[0] = 1; a[2] = 5; *(a + 2); })"),
      (2, "({ int a[4]; &a[3] - &a[1]; })"),
      (4, "({ long a[2]; int *p; (char *)&a[1] - (char *)&a[0] - 4; })"),
      (11, "({ int a[2][3]; a[1][2] = 11; a[1][2]; })"),
      (1, "({ int x = 7; x % 3; })"),
      (40, "5 << 3"),
      (2, "-8 >> 2 == -2 ? 2 : 0"),
      (6, "({ int x = 5; x++; x; })"),
      (5, "({ int x = 5; x++; })"),
      (4, "({ int x = 5; --x; })"),
      (12, "({ int x = 3; x *= 4; x; })"),
      (255, "({ char c = -1; c & 255; })"),
      (1, "({ _Bool b = 7; b; })"),
      (3, "({ struct { char c; int i; } s; s.i = 3; struct { char c; int i; } *p = &s; p->i; })"),
    ],
  );
}

#[test]
fn strings_and_globals() {
  assert_cases(
    "char msg[6] = \"hello\"; int answer = 42; static int hidden;",
    &[
      (104, "msg[0]"),
      (0, "msg[5]"),
      (42, "answer"),
      (0, "hidden"),
      (98, "\"abc\"[1]"),
      (4, "sizeof(\"abc\")"),
      (10, "\"\\n\"[0]"),
    ],
  );
}

#[test]
fn calls_keep_narrow_values_and_alignment() {
  let source = "char narrow(int x) { return x; }\n\
                long add6(long a, long b, long c, long d, long e, long f) { return a + b + c + d + e + f; }\n\
                int main() { int r = 1 + add6(1, 2, 3, 4, 5, 6); return narrow(256 + r); }\n";
  assert_exit(22, source);
}

#[test]
fn static_locals_persist_between_calls() {
  let source = "int next() { static int n; n += 1; return n; }\n\
                int main() { next(); next(); return next(); }\n";
  assert_exit(3, source);
}

#[test]
fn main_falls_through_to_zero() {
  assert_exit(0, "int main() { int x = 3; }\n");
}

#[test]
fn diagnostics_carry_kinds_and_positions() {
  let err = generate_assembly("int main() {\n  return y;\n}\n").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Syntax);
  let pos = err.location().expect("syntax errors have a position");
  assert_eq!((pos.line, pos.column), (2, 10));
  assert!(err.to_string().contains("undefined variable 'y'"));

  let err = generate_assembly("int main() { int a[2]; a = 0; }\n").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Type);

  let err = generate_assembly("int f;\nint f() { return 0; }\n").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Type);
  assert_eq!(err.location().map(|pos| pos.line), Some(2));
}
