//! Property tests for reload: idempotence and edit survival.

mod common;

use common::{Host, Source, snapshot};
use proptest::prelude::*;
use refgraph::{PlugSpec, Value};

#[derive(Debug, Clone)]
enum HostEdit {
    Set(&'static str, i64),
    Reset(&'static str),
}

fn host_edit() -> impl Strategy<Value = HostEdit> {
    let plug = prop::sample::select(vec!["gain", "op2", "bias"]);
    prop_oneof![
        (plug.clone(), -1000i64..1000).prop_map(|(p, v)| HostEdit::Set(p, v)),
        plug.prop_map(HostEdit::Reset),
    ]
}

fn source(gain: i64, bias: i64) -> Source {
    let mut src = Source::new();
    src.add_boundary(PlugSpec::int("gain", 0));
    src.add_boundary(PlugSpec::int("bias", 0));
    src.set("gain", gain);
    src.set("bias", bias);
    src
}

fn apply(host: &mut Host, edit: &HostEdit) {
    match edit {
        HostEdit::Set(name, v) => {
            let plug = host.plug(name);
            host.doc.set_value(plug, *v).unwrap();
        }
        HostEdit::Reset(name) => {
            let plug = host.plug(name);
            host.doc.set_to_default(plug).unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_reload_is_idempotent(
        edits in prop::collection::vec(host_edit(), 0..8),
        gain in -50i64..50,
        bias in -50i64..50,
    ) {
        let def = source(gain, bias).export();
        let mut host = Host::new(&def);
        for edit in &edits {
            apply(&mut host, edit);
        }

        host.reload(&def);
        let once = snapshot(host.doc.graph());
        host.reload(&def);
        prop_assert_eq!(snapshot(host.doc.graph()), once);
    }

    #[test]
    fn prop_edits_survive_any_new_default(
        edited in -1000i64..1000,
        old_default in -50i64..50,
        new_default in -50i64..50,
        bias in -50i64..50,
    ) {
        let mut src = source(old_default, bias);
        let mut host = Host::new(&src.export());
        let gain = host.plug("gain");
        host.doc.set_value(gain, edited).unwrap();

        src.set("gain", new_default);
        src.set("bias", bias + 1);
        host.reload(&src.export());

        let g = host.doc.graph();
        let gain = host.plug("gain");
        prop_assert_eq!(g.value(gain), Some(&Value::Int(edited)));
        prop_assert_eq!(g.default_value(gain), Some(&Value::Int(new_default)));
        prop_assert!(host.doc.has_edit(host.r, gain).unwrap());
        // untouched plugs follow the definition
        prop_assert_eq!(g.value(host.plug("bias")), Some(&Value::Int(bias + 1)));
        prop_assert!(!host.doc.has_edit(host.r, host.plug("bias")).unwrap());
    }

    #[test]
    fn prop_undo_of_reload_is_exact(
        edits in prop::collection::vec(host_edit(), 0..6),
        next_gain in -50i64..50,
    ) {
        let mut src = source(1, 1);
        let mut host = Host::new(&src.export());
        for edit in &edits {
            apply(&mut host, edit);
        }
        let before = snapshot(host.doc.graph());

        src.set("gain", next_gain);
        host.reload(&src.export());
        host.doc.undo().unwrap();
        prop_assert_eq!(snapshot(host.doc.graph()), before);
    }
}
