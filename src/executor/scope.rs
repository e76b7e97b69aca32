//! Scope manager
//!
//! A stack of binding frames. The global frame sits at the bottom and is never
//! popped. Name resolution walks from the innermost frame down to the nearest
//! function frame, then falls back to the global frame, so a function body
//! never sees its caller's locals.

use super::errors::{ErrorInfo, ErrorKind};
use super::types::{Val, ValueType};
use super::values::{coerce, coerce_like, out_of_range};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

/// A declared name: declared type, current value, mutability
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: ValueType,
    pub value: Val,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub kind: ScopeKind,
    vars: IndexMap<String, Binding>,
}

impl ScopeFrame {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            vars: IndexMap::new(),
        }
    }
}

/// One step of an element access path (`a[2].x`)
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Index(usize),
    Field(String),
}

#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame::new(ScopeKind::Global)],
        }
    }

    /// Number of live frames, the global frame included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self, kind: ScopeKind) {
        self.frames.push(ScopeFrame::new(kind));
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Destroy every frame above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    /// Declare `name` in the innermost frame
    pub fn declare(
        &mut self,
        name: &str,
        ty: ValueType,
        value: Val,
        mutable: bool,
    ) -> Result<(), ErrorInfo> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| ErrorInfo::undeclared(name))?;
        if frame.vars.contains_key(name) {
            return Err(ErrorInfo::redeclaration(name));
        }
        frame.vars.insert(
            name.to_string(),
            Binding { ty, value, mutable },
        );
        Ok(())
    }

    /// Index of the frame that resolves `name`
    fn resolve(&self, name: &str) -> Option<usize> {
        for (i, frame) in self.frames.iter().enumerate().rev() {
            if frame.vars.contains_key(name) {
                return Some(i);
            }
            if frame.kind == ScopeKind::Function {
                break;
            }
        }
        self.frames[0].vars.contains_key(name).then_some(0)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.resolve(name).and_then(|i| self.frames[i].vars.get(name))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Result<&Binding, ErrorInfo> {
        self.get(name).ok_or_else(|| ErrorInfo::undeclared(name))
    }

    fn binding_mut(&mut self, name: &str) -> Result<&mut Binding, ErrorInfo> {
        let i = self.resolve(name).ok_or_else(|| ErrorInfo::undeclared(name))?;
        let binding = self.frames[i]
            .vars
            .get_mut(name)
            .ok_or_else(|| ErrorInfo::undeclared(name))?;
        if !binding.mutable {
            return Err(ErrorInfo::type_mismatch(format!(
                "assignment of read-only variable '{name}'"
            )));
        }
        Ok(binding)
    }

    /// Replace the whole value of `name`, converted to its declared type
    pub fn assign(&mut self, name: &str, value: Val) -> Result<&Binding, ErrorInfo> {
        let binding = self.binding_mut(name)?;
        binding.value = coerce(value, &binding.ty)?;
        Ok(binding)
    }

    /// Read the element of `name` reached by `path`
    pub fn read_path(&self, name: &str, path: &[PathSeg]) -> Result<Val, ErrorInfo> {
        let mut current = &self.lookup(name)?.value;
        for (i, seg) in path.iter().enumerate() {
            current = match (seg, current) {
                (PathSeg::Index(idx), Val::Array(items)) => items
                    .get(*idx)
                    .ok_or_else(|| out_of_range(*idx, items.len()))?,
                (PathSeg::Index(idx), Val::Str(s)) if i + 1 == path.len() => {
                    return s
                        .chars()
                        .nth(*idx)
                        .map(Val::Char)
                        .ok_or_else(|| out_of_range(*idx, s.chars().count()));
                }
                (PathSeg::Field(field), Val::Struct(s)) => {
                    s.fields.get(field).ok_or_else(|| no_member(current, field))?
                }
                (seg, other) => return Err(bad_access(seg, other)),
            };
        }
        Ok(current.clone())
    }

    /// Replace one element of `name`
    ///
    /// The container is copied, the copy is written, and the copy replaces the
    /// binding's value. Nothing that cloned the old value can observe the write.
    pub fn assign_path(
        &mut self,
        name: &str,
        path: &[PathSeg],
        value: Val,
    ) -> Result<&Binding, ErrorInfo> {
        if path.is_empty() {
            return self.assign(name, value);
        }
        let binding = self.binding_mut(name)?;
        let mut container = binding.value.clone();
        write_at(&mut container, path, value)?;
        binding.value = container;
        Ok(binding)
    }
}

fn write_at(target: &mut Val, path: &[PathSeg], value: Val) -> Result<(), ErrorInfo> {
    let Some((seg, rest)) = path.split_first() else {
        *target = coerce_like(value, target)?;
        return Ok(());
    };
    match (seg, target) {
        (PathSeg::Index(idx), Val::Array(items)) => {
            let len = items.len();
            let slot = items.get_mut(*idx).ok_or_else(|| out_of_range(*idx, len))?;
            write_at(slot, rest, value)
        }
        (PathSeg::Index(idx), Val::Str(s)) if rest.is_empty() => {
            let mut chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let slot = chars.get_mut(*idx).ok_or_else(|| out_of_range(*idx, len))?;
            match coerce(value, &ValueType::Char)? {
                Val::Char(c) => *slot = c,
                other => {
                    return Err(ErrorInfo::type_mismatch(format!(
                        "cannot store {} in a String",
                        other.type_name()
                    )))
                }
            }
            *s = chars.into_iter().collect();
            Ok(())
        }
        (PathSeg::Field(field), Val::Struct(s)) => {
            let type_name = s.type_name.clone();
            let slot = s.fields.get_mut(field).ok_or_else(|| {
                ErrorInfo::type_mismatch(format!("{type_name} has no member named '{field}'"))
            })?;
            write_at(slot, rest, value)
        }
        (seg, other) => Err(bad_access(seg, other)),
    }
}

fn no_member(val: &Val, field: &str) -> ErrorInfo {
    ErrorInfo::type_mismatch(format!(
        "{} has no member named '{field}'",
        val.type_name()
    ))
}

fn bad_access(seg: &PathSeg, val: &Val) -> ErrorInfo {
    match seg {
        PathSeg::Index(_) => ErrorInfo::new(
            ErrorKind::TypeMismatch,
            format!("{} is not indexable", val.type_name()),
        ),
        PathSeg::Field(field) => no_member(val, field),
    }
}
