//! The closed set of classes that can appear in a `.rap` stream.
//!
//! Classes are resolved by `(library id, qualified name)`.
//! Library `0` is the system library, `2` is the `raptor` assembly, and `3` is `System.Drawing`.
//! Nested types use the `Outer+Inner` naming convention.

/// The library id of the core system library (implicit, never declared by an `Assembly` record).
pub const SYSTEM_LIBRARY: i32 = 0;
/// The library id of the `raptor` assembly.
pub const RAPTOR_LIBRARY: i32 = 2;
/// The library id of the `System.Drawing` assembly.
pub const DRAWING_LIBRARY: i32 = 3;

/// A known class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassKind {
    SystemInt32,
    SystemBoolean,
    SystemGuid,
    DrawingRectangle,

    SubChartKind,
    EventKind,
    RectangleKind,
    LoggingInfo,

    Oval,
    OvalProcedure,
    Rectangle,
    IfControl,
    Loop,
    Parallelogram,
    CommentBox,
    FootPrint,
}

const SYSTEM_CLASSES: &[(&str, ClassKind)] = &[
    ("System.Int32", ClassKind::SystemInt32),
    ("System.Boolean", ClassKind::SystemBoolean),
    ("System.Guid", ClassKind::SystemGuid),
];
const RAPTOR_CLASSES: &[(&str, ClassKind)] = &[
    ("raptor.Subchart_Kinds", ClassKind::SubChartKind),
    ("raptor.Oval", ClassKind::Oval),
    ("raptor.Component+FootPrint", ClassKind::FootPrint),
    ("raptor.Parallelogram", ClassKind::Parallelogram),
    ("raptor.logging_info", ClassKind::LoggingInfo),
    ("raptor.logging_info+event_kind", ClassKind::EventKind),
    ("raptor.IF_Control", ClassKind::IfControl),
    ("raptor.Rectangle", ClassKind::Rectangle),
    ("raptor.Rectangle+Kind_Of", ClassKind::RectangleKind),
    ("raptor.CommentBox", ClassKind::CommentBox),
    ("raptor.Loop", ClassKind::Loop),
    ("raptor.Oval_Procedure", ClassKind::OvalProcedure),
];
const DRAWING_CLASSES: &[(&str, ClassKind)] = &[
    ("System.Drawing.Rectangle", ClassKind::DrawingRectangle),
];

/// Resolves a class by library id and qualified name.
/// Returns [`None`] if either the library or the class within it is unknown.
pub fn resolve(library_id: i32, name: &str) -> Option<ClassKind> {
    let table = match library_id {
        SYSTEM_LIBRARY => SYSTEM_CLASSES,
        RAPTOR_LIBRARY => RAPTOR_CLASSES,
        DRAWING_LIBRARY => DRAWING_CLASSES,
        _ => return None,
    };
    table.iter().find(|x| x.0 == name).map(|x| x.1)
}

impl ClassKind {
    /// The qualified name of the class.
    pub fn name(self) -> &'static str {
        SYSTEM_CLASSES.iter().chain(RAPTOR_CLASSES).chain(DRAWING_CLASSES)
            .find(|x| x.1 == self).map(|x| x.0).unwrap_or("?")
    }
    /// The library the class lives in.
    pub fn library(self) -> i32 {
        match self {
            ClassKind::SystemInt32 | ClassKind::SystemBoolean | ClassKind::SystemGuid => SYSTEM_LIBRARY,
            ClassKind::DrawingRectangle => DRAWING_LIBRARY,
            _ => RAPTOR_LIBRARY,
        }
    }
    /// Checks if this class is a flowchart component that can be linked into a control-flow path.
    pub fn is_component(self) -> bool {
        matches!(self, ClassKind::Oval | ClassKind::OvalProcedure | ClassKind::Rectangle | ClassKind::IfControl | ClassKind::Loop | ClassKind::Parallelogram)
    }
    /// The members a class declaration must contain.
    ///
    /// Members not listed here are still decoded and kept, but nothing reads them.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            ClassKind::SystemInt32 | ClassKind::SystemBoolean => &["m_value"],
            ClassKind::SystemGuid => &["_a", "_b", "_c", "_d", "_e", "_f", "_g", "_h", "_i", "_j", "_k"],
            ClassKind::DrawingRectangle => &["x", "y", "width", "height"],
            ClassKind::SubChartKind | ClassKind::EventKind | ClassKind::RectangleKind => &["value__"],
            ClassKind::LoggingInfo => &["_count"],
            ClassKind::Oval | ClassKind::OvalProcedure => &["_text_str", "_Successor"],
            ClassKind::Rectangle => &["_text_str", "_Successor", "_kind"],
            ClassKind::IfControl => &["_text_str", "_Successor", "_left_Child", "_right_Child"],
            ClassKind::Loop => &["_text_str", "_Successor", "_before_Child", "_after_Child"],
            ClassKind::Parallelogram => &["_text_str", "_Successor", "_prompt", "_is_input"],
            ClassKind::CommentBox | ClassKind::FootPrint => &[],
        }
    }
}

#[test]
fn test_resolve() {
    assert_eq!(resolve(0, "System.Int32"), Some(ClassKind::SystemInt32));
    assert_eq!(resolve(0, "System.Guid"), Some(ClassKind::SystemGuid));
    assert_eq!(resolve(2, "raptor.Oval"), Some(ClassKind::Oval));
    assert_eq!(resolve(2, "raptor.Rectangle+Kind_Of"), Some(ClassKind::RectangleKind));
    assert_eq!(resolve(2, "raptor.logging_info+event_kind"), Some(ClassKind::EventKind));
    assert_eq!(resolve(3, "System.Drawing.Rectangle"), Some(ClassKind::DrawingRectangle));

    assert_eq!(resolve(2, "System.Int32"), None);
    assert_eq!(resolve(0, "raptor.Oval"), None);
    assert_eq!(resolve(2, "raptor.oval"), None);
    assert_eq!(resolve(1, "raptor.Oval"), None);
    assert_eq!(resolve(7, "System.Drawing.Rectangle"), None);
}

#[test]
fn test_class_names_round_trip() {
    for kind in [ClassKind::SystemBoolean, ClassKind::Loop, ClassKind::FootPrint, ClassKind::DrawingRectangle, ClassKind::OvalProcedure] {
        assert_eq!(resolve(kind.library(), kind.name()), Some(kind));
    }
}
