use crate::judge::extract::{PLOT_END_MARKER, PLOT_START_MARKER};

pub const PLOT_OUTPUT_PATH: &str = "/tmp/output.png";

const PLOT_PROLOGUE: &str = "graphics_toolkit(\"gnuplot\");\nfigure(\"visible\", \"off\");\n";

const PLOT_EXPORT: &str = "print(\"/tmp/output.png\", \"-dpng\", \"-S640,480\");\n";

/// Wraps learner code so the current figure is rendered headlessly and written to
/// [`PLOT_OUTPUT_PATH`]. The submitted code appears verbatim between prologue and export.
pub fn wrap_for_plot(code: &str) -> String {
    let mut wrapped =
        String::with_capacity(PLOT_PROLOGUE.len() + code.len() + PLOT_EXPORT.len() + 1);
    wrapped.push_str(PLOT_PROLOGUE);
    wrapped.push_str(code);
    wrapped.push('\n');
    wrapped.push_str(PLOT_EXPORT);
    wrapped
}

/// Like [`wrap_for_plot`], then prints the exported PNG base64-encoded between the
/// sentinel markers so it survives the judge's text-only stdout.
pub fn wrap_for_plot_with_payload(code: &str) -> String {
    let mut wrapped = wrap_for_plot(code);
    wrapped.push_str(&payload_epilogue());
    wrapped
}

fn payload_epilogue() -> String {
    format!(
        concat!(
            "__plot_fid = fopen(\"{path}\", \"r\");\n",
            "if __plot_fid >= 0\n",
            "  __plot_bytes = fread(__plot_fid, Inf, \"uint8=>uint8\");\n",
            "  fclose(__plot_fid);\n",
            "  printf(\"\\n{start}\\n%s\\n{end}\\n\", matlab.net.base64encode(__plot_bytes'));\n",
            "end\n",
        ),
        path = PLOT_OUTPUT_PATH,
        start = PLOT_START_MARKER,
        end = PLOT_END_MARKER,
    )
}
