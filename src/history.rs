//! Undo and redo over opaque change tokens.
//!
//! The history never inspects a token; it only stacks them and hands
//! them to a revert function, which must return the token that would
//! redo what it just undid. [`Delta::revert`](crate::delta::Delta::revert)
//! has exactly that shape.

/// An undo/redo stack over change tokens of type `T`.
pub struct ChangeHistory<T> {
  revert: Box<dyn FnMut(T) -> T>,
  undo_stack: Vec<T>,
  redo_stack: Vec<T>,
  current: Option<T>,
  on_availability: Option<Box<dyn FnMut(bool, bool)>>,
}

impl<T: Default> ChangeHistory<T> {
  /// Creates a history around `revert`, which plays a token backwards
  /// and returns its inverse.
  pub fn new(revert: impl FnMut(T) -> T + 'static) -> ChangeHistory<T> {
    ChangeHistory {
      revert: Box::new(revert),
      undo_stack: Vec::new(),
      redo_stack: Vec::new(),
      current: None,
      on_availability: None,
    }
  }

  /// Registers a callback invoked with `(can_undo, can_redo)` whenever
  /// either may have changed.
  pub fn on_availability_changed(&mut self, observer: impl FnMut(bool, bool) + 'static) {
    self.on_availability = Some(Box::new(observer));
    self.notify();
  }

  /// The token accumulating the edit in progress, created on first use.
  ///
  /// Starting a new edit makes every redo unreachable, so the redo stack
  /// is dropped here.
  pub fn current_change(&mut self) -> &mut T {
    if self.current.is_none() {
      self.current = Some(T::default());
      self.redo_stack.clear();
      self.notify();
    }
    self.current.as_mut().unwrap()
  }

  /// Seals the edit in progress, making it one undoable step.
  pub fn change_completed(&mut self) {
    if let Some(change) = self.current.take() {
      self.undo_stack.push(change);
      self.notify();
    }
  }

  /// True when there is anything to undo.
  pub fn can_undo(&self) -> bool {
    self.current.is_some() || !self.undo_stack.is_empty()
  }

  /// True when there is anything to redo.
  pub fn can_redo(&self) -> bool {
    !self.redo_stack.is_empty()
  }

  /// Undoes the most recent step, sealing the edit in progress first.
  pub fn undo(&mut self) {
    self.change_completed();
    if let Some(change) = self.undo_stack.pop() {
      let inverse = (self.revert)(change);
      assert!(
        self.current.is_none(),
        "an edit started while an undo was in progress"
      );
      self.redo_stack.push(inverse);
    }
    self.notify();
  }

  /// Redoes the most recently undone step.
  pub fn redo(&mut self) {
    if let Some(change) = self.redo_stack.pop() {
      let inverse = (self.revert)(change);
      self.undo_stack.push(inverse);
    }
    self.notify();
  }

  fn notify(&mut self) {
    let can_undo = self.current.is_some() || !self.undo_stack.is_empty();
    let can_redo = !self.redo_stack.is_empty();
    if let Some(observer) = self.on_availability.as_mut() {
      observer(can_undo, can_redo);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  use crate::delta::Delta;
  use crate::store::ByteStore;

  // A fake token: the list of values applied, in order. Reverting negates
  // them against a shared register.
  #[derive(Default, Clone, PartialEq, Debug)]
  struct FakeChange(Vec<i32>);

  fn counter_history() -> (Rc<RefCell<i32>>, ChangeHistory<FakeChange>) {
    let register = Rc::new(RefCell::new(0));
    let handle = Rc::clone(&register);
    let history = ChangeHistory::new(move |change: FakeChange| {
      for value in &change.0 {
        *handle.borrow_mut() -= value;
      }
      FakeChange(change.0.iter().map(|v| -v).collect())
    });
    (register, history)
  }

  fn apply(register: &Rc<RefCell<i32>>, history: &mut ChangeHistory<FakeChange>, value: i32) {
    *register.borrow_mut() += value;
    history.current_change().0.push(value);
    history.change_completed();
  }

  #[test]
  fn undo_and_redo_walk_the_same_values() {
    let (register, mut history) = counter_history();
    apply(&register, &mut history, 3);
    apply(&register, &mut history, 4);
    assert_eq!(*register.borrow(), 7);

    history.undo();
    assert_eq!(*register.borrow(), 3);
    history.undo();
    assert_eq!(*register.borrow(), 0);
    history.redo();
    history.redo();
    assert_eq!(*register.borrow(), 7);
  }

  #[test]
  fn undo_with_nothing_recorded_is_a_no_op() {
    let (register, mut history) = counter_history();
    history.undo();
    assert_eq!(*register.borrow(), 0);
    assert!(!history.can_undo());
    assert!(!history.can_redo());
  }

  #[test]
  fn a_new_edit_drops_the_redo_stack() {
    let (register, mut history) = counter_history();
    apply(&register, &mut history, 3);
    history.undo();
    assert!(history.can_redo());

    apply(&register, &mut history, 5);
    assert!(!history.can_redo());
    assert_eq!(*register.borrow(), 5);
  }

  #[test]
  fn one_token_can_hold_many_edits() {
    let (register, mut history) = counter_history();
    *register.borrow_mut() += 2;
    history.current_change().0.push(2);
    *register.borrow_mut() += 3;
    history.current_change().0.push(3);
    history.change_completed();

    history.undo();
    assert_eq!(*register.borrow(), 0);
    history.redo();
    assert_eq!(*register.borrow(), 5);
  }

  #[test]
  fn undo_seals_the_edit_in_progress() {
    let (register, mut history) = counter_history();
    *register.borrow_mut() += 9;
    history.current_change().0.push(9);

    history.undo();
    assert_eq!(*register.borrow(), 0);
    assert!(history.can_redo());
  }

  #[test]
  fn steps_are_conserved_across_undo_and_redo() {
    let (register, mut history) = counter_history();
    for value in 1..=4 {
      apply(&register, &mut history, value);
    }
    history.undo();
    history.undo();
    history.redo();
    history.undo();
    history.undo();
    // Four steps in, three net undos: one remains applied.
    assert_eq!(*register.borrow(), 1);
    history.redo();
    history.redo();
    history.redo();
    assert_eq!(*register.borrow(), 10);
    assert!(!history.can_redo());
  }

  #[test]
  fn availability_observer_sees_transitions() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let (register, mut history) = counter_history();
    history.on_availability_changed(move |can_undo, can_redo| {
      log.borrow_mut().push((can_undo, can_redo));
    });

    apply(&register, &mut history, 1);
    history.undo();
    history.redo();

    let seen = seen.borrow();
    assert_eq!(seen.first(), Some(&(false, false)));
    assert!(seen.contains(&(true, false)));
    assert!(seen.contains(&(false, true)));
    assert_eq!(seen.last(), Some(&(true, false)));
  }

  // The real wiring: Delta tokens against a shared store.
  #[test]
  fn two_byte_edits_under_one_token_undo_together() {
    let store = Rc::new(RefCell::new(ByteStore::new(vec![0x00; 0x10])));
    let handle = Rc::clone(&store);
    let mut history =
      ChangeHistory::new(move |delta: Delta| delta.revert(&mut handle.borrow_mut()));

    history
      .current_change()
      .change_data(&mut store.borrow_mut(), 2, 0x11);
    history
      .current_change()
      .change_data(&mut store.borrow_mut(), 3, 0x22);
    history.change_completed();
    assert_eq!(&store.borrow().bytes()[2..4], &[0x11, 0x22]);

    history.undo();
    assert_eq!(&store.borrow().bytes()[2..4], &[0x00, 0x00]);

    history.redo();
    assert_eq!(&store.borrow().bytes()[2..4], &[0x11, 0x22]);
  }
}
