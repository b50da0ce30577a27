//! Shared surfaces for unit tests.

use crate::surface::SurfaceModel;

pub(crate) const WIDGET_SURFACE: &str = r#"
version: "1.0"
library: widget
headers: ["widget.h"]
ban: [widget_debug]
resources:
  widget:
    c_type: widget_t
    states: [unallocated, created, configured, running, finalized]
    transitions:
      - { from: unallocated, to: created, role: constructor }
      - { from: created, to: configured, role: configurator }
      - { from: configured, to: configured, role: configurator }
      - { from: running, to: running, role: configurator }
      - { from: configured, to: running, role: mutator }
      - { from: running, to: running, role: mutator }
      - { from: created, to: created, role: accessor }
      - { from: configured, to: configured, role: accessor }
      - { from: running, to: running, role: accessor }
      - { from: created, to: finalized, role: destructor }
      - { from: configured, to: finalized, role: destructor }
      - { from: running, to: finalized, role: destructor }
  blob:
    c_type: char
    states: [unallocated, valid, finalized]
    transitions:
      - { from: unallocated, to: valid, role: constructor }
      - { from: valid, to: valid, role: accessor }
      - { from: valid, to: finalized, role: destructor }
  child:
    c_type: widget_child_t
    states: [unallocated, detached, finalized]
    transitions:
      - { from: unallocated, to: detached, role: constructor }
      - { from: detached, to: finalized, role: destructor }
  options:
    c_type: widget_options_t
    storage: value
    states: [unallocated, ready, finalized]
    transitions:
      - { from: unallocated, to: ready, role: constructor }
  session:
    c_type: widget_session_t
    states: [unallocated, open, finalized]
    transitions:
      - { from: unallocated, to: open, role: constructor }
      - { from: open, to: open, role: accessor }
      - { from: open, to: finalized, role: destructor }
functions:
  - name: widget_new
    role: constructor
    params:
      - { name: flags, kind: primitive, c_type: int, values: ["0", "1", "-1"] }
    returns: { kind: handle, resource: widget }
  - name: widget_set_name
    role: configurator
    params:
      - { name: w, kind: handle_in, resource: widget }
      - { name: name, kind: primitive, c_type: "const char *", values: ["\"alpha\"", "\"\""] }
    returns: { kind: status, c_type: int }
  - name: widget_run
    role: mutator
    params:
      - { name: w, kind: handle_in, resource: widget }
    returns: { kind: status, c_type: int }
  - name: widget_feed
    role: mutator
    params:
      - { name: w, kind: handle_in, resource: widget }
      - { name: data, kind: buffer, c_type: "unsigned char", size: 64, nullable: true }
      - { name: len, kind: length, of: data }
    returns: { kind: status, c_type: int }
  - name: widget_count
    role: accessor
    requires: [running]
    params:
      - { name: w, kind: handle_in, resource: widget }
    returns: { kind: value, c_type: int }
  - name: widget_copy_into
    role: accessor
    memory_sensitive: true
    params:
      - { name: w, kind: handle_in, resource: widget }
      - { name: out, kind: buffer, c_type: char, size: 32 }
      - { name: n, kind: length, of: out }
    returns: { kind: value, c_type: size_t }
  - name: widget_free
    role: destructor
    params:
      - { name: w, kind: handle_in, resource: widget }
  - name: widget_export
    role: constructor
    params:
      - { name: w, kind: handle_in, resource: widget }
    returns: { kind: handle, resource: blob }
  - name: blob_free
    role: destructor
    params:
      - { name: b, kind: handle_in, resource: blob }
  - name: child_new
    role: constructor
    returns: { kind: handle, resource: child }
  - name: widget_attach
    role: configurator
    params:
      - { name: w, kind: handle_in, resource: widget }
      - { name: c, kind: handle_in, resource: child, transfer: true }
    returns: { kind: status, c_type: int }
  - name: child_free
    role: destructor
    params:
      - { name: c, kind: handle_in, resource: child }
  - name: options_init
    role: constructor
    params:
      - { name: opts, kind: handle_out, resource: options }
  - name: widget_apply
    role: configurator
    params:
      - { name: w, kind: handle_in, resource: widget }
      - { name: opts, kind: handle_in, resource: options }
    returns: { kind: status, c_type: int }
  - name: session_peek
    role: accessor
    params:
      - { name: s, kind: handle_in, resource: session }
    returns: { kind: value, c_type: int }
  - name: widget_debug
    role: accessor
    params:
      - { name: w, kind: handle_in, resource: widget }
"#;

pub(crate) fn widget_surface() -> SurfaceModel {
    match SurfaceModel::from_yaml(WIDGET_SURFACE) {
        Ok(model) => model,
        Err(e) => panic!("widget fixture must load: {e}"),
    }
}

pub(crate) fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}
