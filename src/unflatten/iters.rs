use super::tree::{NodeId, PropId};
use super::{DeviceNode, DeviceProp, DeviceTree};

/***********************************/
/***********  All nodes  ***********/
/***********************************/

/// Iterator over nodes in depth-first pre-order, following each node's `allnext` link.
#[derive(Clone)]
pub struct DeviceNodeIter<'a, 'i: 'a, 'dt> {
    tree: &'a DeviceTree<'i, 'dt>,
    next: Option<NodeId>,
}

impl<'a, 'i: 'a, 'dt> DeviceNodeIter<'a, 'i, 'dt> {
    pub(super) fn new(tree: &'a DeviceTree<'i, 'dt>, next: Option<NodeId>) -> Self {
        Self { tree, next }
    }

    /// Start just after `node`.
    pub fn after(node: &DeviceNode<'a, 'i, 'dt>) -> Self {
        Self::new(node.tree(), node.rec().allnext)
    }
}

impl<'a, 'i: 'a, 'dt> Iterator for DeviceNodeIter<'a, 'i, 'dt> {
    type Item = DeviceNode<'a, 'i, 'dt>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|id| {
            let node = DeviceNode::new(self.tree, id);
            self.next = node.rec().allnext;
            node
        })
    }
}

/***********************************/
/***********  Children   ***********/
/***********************************/

#[derive(Clone)]
pub struct DeviceChildIter<'a, 'i: 'a, 'dt> {
    tree: &'a DeviceTree<'i, 'dt>,
    next: Option<NodeId>,
}

impl<'a, 'i: 'a, 'dt> DeviceChildIter<'a, 'i, 'dt> {
    pub(super) fn new(tree: &'a DeviceTree<'i, 'dt>, next: Option<NodeId>) -> Self {
        Self { tree, next }
    }
}

impl<'a, 'i: 'a, 'dt> Iterator for DeviceChildIter<'a, 'i, 'dt> {
    type Item = DeviceNode<'a, 'i, 'dt>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|id| {
            let node = DeviceNode::new(self.tree, id);
            self.next = node.rec().sibling;
            node
        })
    }
}

/***********************************/
/***********  Props      ***********/
/***********************************/

#[derive(Clone)]
pub struct DevicePropIter<'a, 'i: 'a, 'dt> {
    node: DeviceNode<'a, 'i, 'dt>,
    next: Option<PropId>,
}

impl<'a, 'i: 'a, 'dt> DevicePropIter<'a, 'i, 'dt> {
    pub(super) fn new(node: DeviceNode<'a, 'i, 'dt>, next: Option<PropId>) -> Self {
        Self { node, next }
    }
}

impl<'a, 'i: 'a, 'dt> Iterator for DevicePropIter<'a, 'i, 'dt> {
    type Item = DeviceProp<'a, 'i, 'dt>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|id| {
            let prop = DeviceProp::new(self.node, id);
            self.next = prop.rec().next;
            prop
        })
    }
}

/***********************************/
/***********  Compatible ***********/
/***********************************/

#[derive(Clone)]
pub struct DeviceCompatibleNodeIter<'s, 'a, 'i: 'a, 'dt> {
    pub iter: DeviceNodeIter<'a, 'i, 'dt>,
    pub string: &'s str,
}

impl<'s, 'a, 'i: 'a, 'dt> Iterator for DeviceCompatibleNodeIter<'s, 'a, 'i, 'dt> {
    type Item = DeviceNode<'a, 'i, 'dt>;

    fn next(&mut self) -> Option<Self::Item> {
        let string = self.string;
        self.iter
            .by_ref()
            .find(|node| node.device_is_compatible(string))
    }
}
