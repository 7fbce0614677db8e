//! Canonicalization registry for harvested patch files.
//!
//! Incoming payloads bound for `<patch_root>/**/*.patch` are rewritten by the
//! first built-in rule whose suffix matches the target. Two pieces of local
//! state survive a re-harvest:
//!
//! - the first `index <a>..<b>` header line of the existing target, so blob-id
//!   churn upstream does not show up as a change;
//! - tracked markers: when the existing target has a rule's marker and the
//!   merged text lost it, the rule is applied again.
//!
//! Each rule must be idempotent on the text it produces; a rule that is not
//! yields [`HarvestError::Canonicalization`] for that target.

use std::sync::LazyLock;

use regex::Regex;

use harvest_core::options::DEFAULT_PATCH_ROOT;

use crate::error::HarvestError;

type Transform = fn(&str) -> String;

/// One suffix-keyed rewrite.
#[derive(Debug, Clone, Copy)]
pub struct CanonRule {
    pub name: &'static str,
    pub suffix: &'static str,
    /// Text the rule guarantees; restored when an existing target had it.
    pub marker: Option<&'static str>,
    transform: Transform,
}

impl CanonRule {
    pub fn apply(&self, text: &str) -> String {
        (self.transform)(text)
    }
}

const BUILTIN_RULES: &[CanonRule] = &[
    CanonRule {
        name: "winebrowser-main",
        suffix: "programs_winebrowser_main_c.patch",
        marker: None,
        transform: winebrowser_main,
    },
    CanonRule {
        name: "user32-clipboard",
        suffix: "dlls_user32_clipboard_c.patch",
        marker: None,
        transform: user32_clipboard,
    },
    CanonRule {
        name: "ntdll-loader",
        suffix: "dlls_ntdll_loader_c.patch",
        marker: Some("pWow64SuspendLocalThread"),
        transform: ntdll_loader,
    },
    CanonRule {
        name: "winex11-mouse",
        suffix: "dlls_winex11_drv_mouse_c.patch",
        marker: None,
        transform: winex11_mouse,
    },
    CanonRule {
        name: "wow64-process",
        suffix: "test-bylaws/dlls_wow64_process_c.patch",
        marker: Some("Wow64SuspendLocalThread"),
        transform: wow64_process,
    },
];

static INDEX_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^index\s+.+$").expect("valid index regex"));

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    patch_root: String,
    rules: Vec<CanonRule>,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PATCH_ROOT)
    }
}

impl Canonicalizer {
    pub fn new(patch_root: &str) -> Self {
        Self {
            patch_root: patch_root.trim().trim_matches('/').to_string(),
            rules: BUILTIN_RULES.to_vec(),
        }
    }

    /// Whether `target` (repo-relative) is subject to canonicalization.
    pub fn in_scope(&self, target: &str) -> bool {
        let target = normalize(target);
        !self.patch_root.is_empty()
            && target
                .strip_prefix(self.patch_root.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
            && target.ends_with(".patch")
    }

    pub fn rule_for(&self, target: &str) -> Option<&CanonRule> {
        let target = normalize(target);
        self.rules.iter().find(|r| target.ends_with(r.suffix))
    }

    /// Canonical bytes for `incoming` bound for `target`, given the current
    /// content of the target if it exists.
    ///
    /// Out-of-scope targets and non-UTF-8 payloads pass through unchanged.
    pub fn canonicalize(
        &self,
        target: &str,
        incoming: Vec<u8>,
        existing: Option<&[u8]>,
    ) -> Result<Vec<u8>, HarvestError> {
        if !self.in_scope(target) {
            return Ok(incoming);
        }
        let text = match String::from_utf8(incoming) {
            Ok(text) => text,
            Err(e) => return Ok(e.into_bytes()),
        };
        let rule = self.rule_for(target);

        let mut merged = match rule {
            Some(rule) => {
                let once = rule.apply(&text);
                if rule.apply(&once) != once {
                    return Err(HarvestError::Canonicalization {
                        target: normalize(target).to_string(),
                        rule: rule.name.to_string(),
                    });
                }
                once
            }
            None => text,
        };

        if let Some(existing) = existing {
            let existing = std::str::from_utf8(existing).unwrap_or("");
            merged = keep_index_header(existing, &merged);
            if let Some(rule) = rule {
                if let Some(marker) = rule.marker {
                    if existing.contains(marker) && !merged.contains(marker) {
                        tracing::debug!("restoring marker {marker} in {target}");
                        merged = rule.apply(&merged);
                    }
                }
            }
        }

        Ok(merged.into_bytes())
    }
}

fn normalize(target: &str) -> &str {
    target.trim().trim_start_matches('/')
}

/// Replace the first `index` header of `merged` with the one from `existing`
/// when both have one.
fn keep_index_header(existing: &str, merged: &str) -> String {
    match (INDEX_HEADER.find(existing), INDEX_HEADER.find(merged)) {
        (Some(old), Some(new)) => {
            let mut out = String::with_capacity(merged.len());
            out.push_str(&merged[..new.start()]);
            out.push_str(old.as_str());
            out.push_str(&merged[new.end()..]);
            out
        }
        _ => merged.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Built-in transforms
// ---------------------------------------------------------------------------

/// `call(sock_fd, &var, sizeof(var), 0)` with a pointer cast on the buffer.
fn socket_cast(call: &str, var: &str, cast: &str) -> (Regex, String) {
    let pattern =
        format!(r"{call}\(\s*sock_fd\s*,\s*&{var}\s*,\s*sizeof\({var}\)\s*,\s*0\s*\)");
    let replacement = format!("{call}(sock_fd, ({cast})&{var}, sizeof({var}), 0)");
    (
        Regex::new(&pattern).expect("valid socket call regex"),
        replacement,
    )
}

/// `const`-qualify a plain (optionally `static`) `char *` declaration at the
/// start of a diff line, without doubling an existing `const`.
fn const_decl(decl: &str) -> (Regex, String) {
    let pattern = format!(
        r"(?m)^([+\- ]?[ \t]*(?:static[ \t]+)?)(?:const[ \t]+)?char \*{}",
        regex::escape(decl)
    );
    let replacement = format!("${{1}}const char *{decl}");
    (Regex::new(&pattern).expect("valid decl regex"), replacement)
}

static WINEBROWSER_REWRITES: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    vec![
        socket_cast("send", "net_requestcode", "const char *"),
        socket_cast("send", "net_data_length", "const char *"),
        const_decl("from_unix_to_dos_path"),
        const_decl("path = url + 7;"),
        const_decl("new_url = NULL;"),
    ]
});

static CLIPBOARD_REWRITES: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    vec![
        socket_cast("send", "net_requestcode", "const char *"),
        socket_cast("send", "net_data_format", "const char *"),
        socket_cast("send", "net_data_size", "const char *"),
        socket_cast("recv", "net_data_format", "char *"),
        socket_cast("recv", "net_data_size", "char *"),
    ]
});

fn rewrite_all(text: &str, rewrites: &[(Regex, String)]) -> String {
    rewrites
        .iter()
        .fold(text.to_string(), |acc, (re, rep)| {
            re.replace_all(&acc, rep.as_str()).into_owned()
        })
}

fn winebrowser_main(text: &str) -> String {
    rewrite_all(text, &WINEBROWSER_REWRITES).replace(
        "WINE_OPEN_WITH_ANDROID_BROwSER",
        "WINE_OPEN_WITH_ANDROID_BROWSER",
    )
}

fn user32_clipboard(text: &str) -> String {
    rewrite_all(text, &CLIPBOARD_REWRITES)
}

const PREPARE_FOR_EXCEPTION: &str =
    "void (WINAPI *pWow64PrepareForException)( EXCEPTION_RECORD *rec, CONTEXT *context ) = NULL;\n";
const SUSPEND_LOCAL_THREAD_PTR: &str =
    "NTSTATUS (WINAPI *pWow64SuspendLocalThread)( HANDLE thread, ULONG *count ) = NULL;\n";
const GET_PTR_PREPARE: &str = "        GET_PTR( Wow64PrepareForException );\n";
const GET_PTR_SUSPEND: &str = "        GET_PTR( Wow64SuspendLocalThread );\n";

const LOADER_HUNK: &str = concat!(
    "@@ -4479,6 +4479,7 @@ static void build_wow64_main_module(void)\n",
    " static void (WINAPI *pWow64LdrpInitialize)( CONTEXT *ctx );\n",
    " \n",
    " void (WINAPI *pWow64PrepareForException)( EXCEPTION_RECORD *rec, CONTEXT *context ) = NULL;\n",
    "+NTSTATUS (WINAPI *pWow64SuspendLocalThread)( HANDLE thread, ULONG *count ) = NULL;\n",
    " \n",
    " static void init_wow64( CONTEXT *context )\n",
    " {\n",
    "@@ -4503,6 +4504,7 @@ static void init_wow64( CONTEXT *context )\n",
    " \n",
    "         GET_PTR( Wow64LdrpInitialize );\n",
    "         GET_PTR( Wow64PrepareForException );\n",
    "+        GET_PTR( Wow64SuspendLocalThread );\n",
    " #undef GET_PTR\n",
    "         imports_fixup_done = TRUE;\n",
    "     }\n",
);

fn ntdll_loader(text: &str) -> String {
    let mut out = text.to_string();
    if !out.contains("pWow64SuspendLocalThread") {
        if out.contains(PREPARE_FOR_EXCEPTION) {
            out = out.replace(
                PREPARE_FOR_EXCEPTION,
                &format!("{PREPARE_FOR_EXCEPTION}{SUSPEND_LOCAL_THREAD_PTR}"),
            );
        } else {
            out = format!("{}\n{LOADER_HUNK}", out.trim_end());
        }
    }
    if !out.contains(GET_PTR_SUSPEND.trim_start()) {
        out = out.replace(GET_PTR_PREPARE, &format!("{GET_PTR_PREPARE}{GET_PTR_SUSPEND}"));
    }
    out
}

fn winex11_mouse(text: &str) -> String {
    text.replace(
        "#ifndef __ANDROID__",
        "#if !defined(__ANDROID__) && defined(HAVE_X11_EXTENSIONS_XFIXES_H) && defined(SONAME_LIBXFIXES)",
    )
}

const WOW64_SUSPEND_EXPORT: &str = "
/**********************************************************************
 *           Wow64SuspendLocalThread  (wow64.@)
 */
NTSTATUS WINAPI Wow64SuspendLocalThread( HANDLE thread, ULONG *count )
{
    return NtSuspendThread( thread, count );
}
";

fn wow64_process(text: &str) -> String {
    if text.contains("Wow64SuspendLocalThread") {
        return text.to_string();
    }
    format!("{}\n{WOW64_SUSPEND_EXPORT}", text.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "ci/gamenative/patchsets/28c3a06/android/patches";

    fn target(name: &str) -> String {
        format!("{ROOT}/{name}")
    }

    fn canon(name: &str, incoming: &str, existing: Option<&str>) -> String {
        let c = Canonicalizer::default();
        let out = c
            .canonicalize(
                &target(name),
                incoming.as_bytes().to_vec(),
                existing.map(str::as_bytes),
            )
            .expect("canonicalize");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn scope_requires_patch_root_and_suffix() {
        let c = Canonicalizer::default();
        assert!(c.in_scope(&target("a/b.patch")));
        assert!(c.in_scope(&format!("/{}", target("b.patch"))));
        assert!(!c.in_scope(&target("b.diff")));
        assert!(!c.in_scope("ci/other/b.patch"));
        assert!(!c.in_scope(&format!("{ROOT}x/b.patch")));
    }

    #[test]
    fn out_of_scope_passes_through() {
        let c = Canonicalizer::default();
        let raw = b"#ifndef __ANDROID__\n".to_vec();
        let out = c
            .canonicalize("src/dlls_winex11_drv_mouse_c.patch", raw.clone(), None)
            .unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn non_utf8_passes_through() {
        let c = Canonicalizer::default();
        let raw = vec![0xff, 0xfe, b'#', 0x80];
        let out = c
            .canonicalize(&target("dlls_winex11_drv_mouse_c.patch"), raw.clone(), None)
            .unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn winebrowser_casts_and_const() {
        let incoming = "\
+    send(sock_fd, &net_requestcode, sizeof(net_requestcode), 0);
+    send( sock_fd ,&net_data_length,sizeof(net_data_length),0 );
+#define WINE_OPEN_WITH_ANDROID_BROwSER 1
+static char *from_unix_to_dos_path(char *p)
+    char *path = url + 7;
+    char *new_url = NULL;
";
        let out = canon("programs_winebrowser_main_c.patch", incoming, None);
        assert!(out.contains("send(sock_fd, (const char *)&net_requestcode, sizeof(net_requestcode), 0)"));
        assert!(out.contains("send(sock_fd, (const char *)&net_data_length, sizeof(net_data_length), 0)"));
        assert!(out.contains("WINE_OPEN_WITH_ANDROID_BROWSER"));
        assert!(out.contains("static const char *from_unix_to_dos_path"));
        assert!(out.contains("    const char *path = url + 7;"));
        assert!(out.contains("    const char *new_url = NULL;"));
        assert!(!out.contains("const const"));
        assert_eq!(winebrowser_main(&out), out);
    }

    #[test]
    fn qualified_char_declarations_are_left_alone() {
        let incoming = "\
+unsigned char *from_unix_to_dos_path(char *p)
+    wchar_t *new_url = NULL;
+    x = (char *path = url + 7;
 static char *from_unix_to_dos_path(char *p)
";
        let out = canon("programs_winebrowser_main_c.patch", incoming, None);
        assert!(out.contains("+unsigned char *from_unix_to_dos_path"));
        assert!(out.contains("+    wchar_t *new_url = NULL;"));
        assert!(out.contains("x = (char *path = url + 7;"));
        assert!(out.contains(" static const char *from_unix_to_dos_path"));
        assert!(!out.contains("unsigned const char"));
    }

    #[test]
    fn clipboard_send_and_recv_casts() {
        let incoming = "\
+    recv(sock_fd, &net_data_size, sizeof(net_data_size), 0);
+    send(sock_fd, &net_data_format, sizeof(net_data_format), 0);
";
        let out = canon("dlls_user32_clipboard_c.patch", incoming, None);
        assert!(out.contains("recv(sock_fd, (char *)&net_data_size, sizeof(net_data_size), 0)"));
        assert!(out.contains("send(sock_fd, (const char *)&net_data_format, sizeof(net_data_format), 0)"));
    }

    #[test]
    fn loader_inserts_pointer_after_anchor() {
        let incoming = format!("{PREPARE_FOR_EXCEPTION}{GET_PTR_PREPARE}");
        let out = canon("dlls_ntdll_loader_c.patch", &incoming, None);
        assert!(out.contains(SUSPEND_LOCAL_THREAD_PTR));
        assert!(out.contains(GET_PTR_SUSPEND));
        assert_eq!(ntdll_loader(&out), out);
    }

    #[test]
    fn loader_appends_hunk_without_anchor() {
        let out = canon("dlls_ntdll_loader_c.patch", "diff --git a/x b/x\n", None);
        assert!(out.starts_with("diff --git a/x b/x\n@@ -4479,6"));
        assert!(out.contains("pWow64SuspendLocalThread"));
        assert!(out.contains("GET_PTR( Wow64SuspendLocalThread );"));
    }

    #[test]
    fn mouse_guard_widened_once() {
        let out = canon("dlls_winex11_drv_mouse_c.patch", "#ifndef __ANDROID__\n", None);
        assert!(out.starts_with("#if !defined(__ANDROID__) && defined(HAVE_X11_EXTENSIONS_XFIXES_H)"));
        assert_eq!(winex11_mouse(&out), out);
    }

    #[test]
    fn wow64_export_appended_when_missing() {
        let out = canon("test-bylaws/dlls_wow64_process_c.patch", "+int x;\n\n", None);
        assert!(out.starts_with("+int x;\n\n/****"));
        assert!(out.contains("return NtSuspendThread( thread, count );"));
        let again = canon("test-bylaws/dlls_wow64_process_c.patch", &out, None);
        assert_eq!(again, out);
    }

    #[test]
    fn wow64_rule_needs_test_bylaws_directory() {
        let out = canon("dlls_wow64_process_c.patch", "+int x;\n", None);
        assert_eq!(out, "+int x;\n");
    }

    #[test]
    fn existing_index_header_is_kept() {
        let existing = "diff --git a/f b/f\nindex 1111111..2222222 100644\n--- a/f\n";
        let incoming = "diff --git a/f b/f\nindex aaaaaaa..bbbbbbb 100644\n--- a/f\n+new\n";
        let out = canon("misc.patch", incoming, Some(existing));
        assert_eq!(
            out,
            "diff --git a/f b/f\nindex 1111111..2222222 100644\n--- a/f\n+new\n"
        );
    }

    #[test]
    fn index_header_untouched_without_existing_header() {
        let incoming = "index aaaaaaa..bbbbbbb 100644\n";
        let out = canon("misc.patch", incoming, Some("no header here\n"));
        assert_eq!(out, incoming);
    }

    #[test]
    fn marker_restored_after_header_swap() {
        let existing = "index 1..2 100644\n+NTSTATUS (WINAPI *pWow64SuspendLocalThread)\n";
        let out = canon("dlls_ntdll_loader_c.patch", "index 3..4 100644\n", Some(existing));
        assert!(out.starts_with("index 1..2 100644\n"));
        assert!(out.contains("pWow64SuspendLocalThread"));
    }

    #[test]
    fn non_idempotent_rule_is_an_error() {
        fn doubling(text: &str) -> String {
            format!("{text}x")
        }
        let c = Canonicalizer {
            patch_root: ROOT.to_string(),
            rules: vec![CanonRule {
                name: "doubling",
                suffix: "grow.patch",
                marker: None,
                transform: doubling,
            }],
        };
        let err = c
            .canonicalize(&target("grow.patch"), b"a".to_vec(), None)
            .expect_err("not idempotent");
        assert!(matches!(err, HarvestError::Canonicalization { ref rule, .. } if rule == "doubling"));
    }

    #[test]
    fn custom_patch_root() {
        let c = Canonicalizer::new("/patches/");
        assert!(c.in_scope("patches/dlls_winex11_drv_mouse_c.patch"));
        assert!(!c.in_scope(&target("dlls_winex11_drv_mouse_c.patch")));
    }
}
