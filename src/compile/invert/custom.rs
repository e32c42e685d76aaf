use indexmap::{IndexMap, IndexSet};
use serde::*;

use crate::{Assembly, FunctionId, Node, SigNode};

use super::{InversionError, InversionResult};

/// Inverses supplied by the author of a program
///
/// An entry may have an un inverse, an under pair, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEntry {
    /// The function to run in place of `un f`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub un: Option<SigNode>,
    /// The functions to run before and after the inner function of `under f`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub under: Option<(SigNode, SigNode)>,
}

impl CustomEntry {
    fn nodes(&self) -> impl Iterator<Item = &Node> {
        (self.un.iter())
            .chain(self.under.iter().flat_map(|(before, after)| [before, after]))
            .map(|sn| &sn.node)
    }
}

/// The custom inverses registered in one compilation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomInverses {
    entries: IndexMap<FunctionId, CustomEntry>,
}

impl CustomInverses {
    /// Register a function's un inverse
    ///
    /// A later registration for the same function replaces this one.
    /// The registry is left unchanged if the inverse refers back to the function.
    pub fn register_inverse(
        &mut self,
        id: FunctionId,
        inverse: SigNode,
        asm: &Assembly,
    ) -> InversionResult {
        self.check_cycle(&id, [&inverse.node], asm)?;
        tracing::debug!(%id, sig = %inverse.sig, "registered custom inverse");
        self.entries.entry(id).or_default().un = Some(inverse);
        Ok(())
    }
    /// Register the functions that run before and after the inner function of an under
    ///
    /// A later registration for the same function replaces this one.
    /// The registry is left unchanged if either function refers back to the function.
    pub fn register_under(
        &mut self,
        id: FunctionId,
        before: SigNode,
        after: SigNode,
        asm: &Assembly,
    ) -> InversionResult {
        self.check_cycle(&id, [&before.node, &after.node], asm)?;
        tracing::debug!(%id, before = %before.sig, after = %after.sig, "registered custom under");
        self.entries.entry(id).or_default().under = Some((before, after));
        Ok(())
    }
    /// Get a function's custom un inverse
    pub fn resolve_inverse(&self, id: &FunctionId) -> Option<&SigNode> {
        self.entries.get(id)?.un.as_ref()
    }
    /// Get a function's custom under pair
    pub fn resolve_under(&self, id: &FunctionId) -> Option<(&SigNode, &SigNode)> {
        let (before, after) = self.entries.get(id)?.under.as_ref()?;
        Some((before, after))
    }
    /// Check if a function has any custom inverse
    pub fn contains(&self, id: &FunctionId) -> bool {
        self.entries.contains_key(id)
    }
    /// Get the number of functions with custom inverses
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    /// Check if no custom inverses are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Iterate over the registered entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&FunctionId, &CustomEntry)> {
        self.entries.iter()
    }
    /// Whether a node has a custom inverse that takes precedence over any under rule
    pub(crate) fn overrides(&self, node: &Node) -> bool {
        !self.entries.is_empty() && node.function_id().is_some_and(|id| self.contains(&id))
    }
    /// Whether a node has a custom un inverse that takes precedence over any inverse rule
    pub(crate) fn overrides_un(&self, node: &Node) -> bool {
        !self.entries.is_empty()
            && (node.function_id()).is_some_and(|id| self.resolve_inverse(&id).is_some())
    }
    /// Make sure nothing reachable from some nodes refers to a function
    ///
    /// References are followed into the bodies of called functions and into
    /// the pipelines registered for other functions.
    fn check_cycle<'a>(
        &'a self,
        id: &FunctionId,
        roots: impl IntoIterator<Item = &'a Node>,
        asm: &'a Assembly,
    ) -> InversionResult {
        let mut visited = IndexSet::new();
        let mut queue: Vec<&Node> = roots.into_iter().collect();
        while let Some(node) = queue.pop() {
            match node {
                Node::Run(nodes) => {
                    queue.extend(nodes.iter());
                    continue;
                }
                Node::Mod(_, args, _) | Node::ImplMod(_, args, _) => {
                    queue.extend(args.iter().map(|sn| &sn.node));
                }
                _ => {}
            }
            let Some(ref_id) = node.function_id() else {
                continue;
            };
            if &ref_id == id {
                tracing::warn!(%id, "rejected custom inverse that refers back to its function");
                return Err(InversionError::CyclicCustomInverse(id.clone()));
            }
            if !visited.insert(ref_id.clone()) {
                continue;
            }
            if let Node::Call(f, _) = node {
                queue.extend(asm.get(f));
            }
            if let Some(entry) = self.entries.get(&ref_id) {
                queue.extend(entry.nodes());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Primitive::*, Signature};
    use ecow::eco_vec;

    fn prims(prims: impl IntoIterator<Item = crate::Primitive>) -> SigNode {
        Node::from_iter(prims.into_iter().map(|p| Node::Prim(p, 0)))
            .sig_node()
            .unwrap()
    }

    #[test]
    fn last_registration_wins() {
        let asm = Assembly::default();
        let mut custom = CustomInverses::default();
        custom
            .register_inverse(Sort.into(), prims([Reverse]), &asm)
            .unwrap();
        custom
            .register_inverse(Sort.into(), prims([Identity]), &asm)
            .unwrap();
        assert_eq!(custom.len(), 1);
        assert_eq!(
            custom.resolve_inverse(&Sort.into()),
            Some(&prims([Identity]))
        );
        assert_eq!(custom.resolve_under(&Sort.into()), None);
    }

    #[test]
    fn direct_cycle() {
        let asm = Assembly::default();
        let mut custom = CustomInverses::default();
        let res = custom.register_inverse(Sort.into(), prims([Neg, Sort]), &asm);
        assert_eq!(res, Err(InversionError::CyclicCustomInverse(Sort.into())));
        assert!(custom.is_empty());
    }

    #[test]
    fn cycle_through_calls_and_entries() {
        let mut asm = Assembly::default();
        let sig = Signature::new(1, 1);
        let f = asm.add_function("f".into(), sig, Node::Prim(Neg, 0));
        let g_body = Node::Call(f.clone(), 1);
        let g = asm.add_function("g".into(), sig, g_body);
        let mut custom = CustomInverses::default();
        // f's inverse calls g, which calls f
        let inv = SigNode::new(sig, Node::Call(g, 2));
        let res = custom.register_inverse(f.id.clone(), inv, &asm);
        assert_eq!(res, Err(InversionError::CyclicCustomInverse(f.id.clone())));
        // Going through another function's registered inverse
        custom
            .register_inverse(Sort.into(), SigNode::new(sig, Node::Call(f.clone(), 3)), &asm)
            .unwrap();
        let res = custom.register_under(f.id.clone(), prims([Sort]), prims([Identity]), &asm);
        assert_eq!(res, Err(InversionError::CyclicCustomInverse(f.id.clone())));
        assert!(custom.resolve_under(&f.id).is_none());
    }

    #[test]
    fn modifier_arguments_are_searched() {
        let asm = Assembly::default();
        let mut custom = CustomInverses::default();
        let inv = Node::Mod(Dip, eco_vec![prims([Sort])], 0);
        let res = custom.register_inverse(Sort.into(), SigNode::new(Signature::new(2, 2), inv), &asm);
        assert!(res.is_err());
    }
}
